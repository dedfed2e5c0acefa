use fixed::types::I32F32;

/// A length in device units: one pixel at the renderer's resolution.
///
/// Values are stored in fixed point and quantized to thousandths, so glyph
/// positions compare exactly and emitted numbers never drift between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Px(I32F32);

impl Px {
    pub const ZERO: Px = Px(I32F32::from_bits(0));

    /// Converts a finite float; anything else becomes `None`.
    pub fn try_from_f32(value: f32) -> Option<Px> {
        if !value.is_finite() {
            return None;
        }
        let milli = (value as f64 * 1000.0).round();
        if milli.abs() >= (i32::MAX as f64) * 1000.0 {
            return None;
        }
        Some(Px::from_milli_i64(milli as i64))
    }

    pub fn from_f32(value: f32) -> Px {
        Px::try_from_f32(value).unwrap_or(Px::ZERO)
    }

    pub fn from_i32(value: i32) -> Px {
        Px::from_milli_i64((value as i64) * 1000)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_milli_i64(milli: i64) -> Px {
        Px::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Px {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Px(I32F32::from_bits(bits))
    }

    pub fn abs(self) -> Px {
        if self.to_milli_i64() < 0 { -self } else { self }
    }

    pub fn max(self, other: Px) -> Px {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Px) -> Px {
        if self <= other { self } else { other }
    }

    /// Scales by a factor given as a ratio of integers, rounding half away from zero.
    pub fn mul_ratio(self, num: i64, denom: i64) -> Px {
        if denom == 0 {
            return Px::ZERO;
        }
        let milli = self.to_milli_i64() as i128;
        Px::from_milli_i128(div_round_i128(milli.saturating_mul(num as i128), denom as i128))
    }
}

impl std::ops::Add for Px {
    type Output = Px;
    fn add(self, rhs: Px) -> Px {
        Px::from_milli_i128(self.to_milli_i64() as i128 + rhs.to_milli_i64() as i128)
    }
}

impl std::ops::AddAssign for Px {
    fn add_assign(&mut self, rhs: Px) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Px {
    type Output = Px;
    fn sub(self, rhs: Px) -> Px {
        Px::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

impl std::ops::Neg for Px {
    type Output = Px;
    fn neg(self) -> Px {
        Px::from_milli_i128(-(self.to_milli_i64() as i128))
    }
}

fn div_round_i128(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let den_abs = den.abs();
    let sign = if (num < 0) != (den < 0) { -1 } else { 1 };
    sign * ((num.abs() + den_abs / 2) / den_abs)
}

/// Page size in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn from_cm(width_cm: f32, height_cm: f32) -> Self {
        Self {
            width: 72.0 * width_cm / 2.54,
            height: 72.0 * height_cm / 2.54,
        }
    }

    pub fn landscape(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

/// Axis-aligned rectangle in device units, normalized so width and height are non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: Px,
    pub y: Px,
    pub width: Px,
    pub height: Px,
}

impl Rect {
    pub fn from_corners(x1: Px, y1: Px, x2: Px, y2: Px) -> Self {
        let x = x1.min(x2);
        let y = y1.min(y2);
        Self {
            x,
            y,
            width: x1.max(x2) - x,
            height: y1.max(y2) - y,
        }
    }

    pub fn right(&self) -> Px {
        self.x + self.width
    }

    pub fn top(&self) -> Px {
        self.y + self.height
    }
}

/// An 8-bit RGBA colour. Alpha 255 is opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Components in thousandths, `c * 1000 / 255` truncated.
    pub(crate) fn rgb_milli(&self) -> [i64; 3] {
        [channel_milli(self.r), channel_milli(self.g), channel_milli(self.b)]
    }

    pub(crate) fn alpha_milli(&self) -> u16 {
        channel_milli(self.a) as u16
    }

    pub(crate) fn opaque(self) -> Self {
        Self { a: 255, ..self }
    }
}

fn channel_milli(value: u8) -> i64 {
    value as i64 * 1000 / 255
}

/// Affine matrix `[a b c d e f]` mapping `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn rotate(radians: f64) -> Self {
        let (sin, cos) = (libm::sin(radians), libm::cos(radians));
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// Applies `self` first, then `next`.
    pub fn then(self, next: Transform) -> Self {
        Self {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn px_rejects_non_finite_input() {
        assert_eq!(Px::try_from_f32(f32::NAN), None);
        assert_eq!(Px::try_from_f32(f32::INFINITY), None);
        assert_eq!(Px::try_from_f32(12.5).map(Px::to_milli_i64), Some(12_500));
    }

    #[test]
    fn px_arithmetic_is_exact_in_thousandths() {
        let mut x = Px::ZERO;
        for _ in 0..1000 {
            x += Px::from_f32(0.001);
        }
        assert_eq!(x, Px::from_i32(1));
        assert_eq!((Px::from_i32(3) - Px::from_i32(5)).abs(), Px::from_i32(2));
        assert_eq!(Px::from_i32(10).mul_ratio(-1000, 100).to_milli_i64(), -100_000);
    }

    #[test]
    fn colour_channels_quantize_to_thousandths() {
        assert_eq!(Color::rgb(255, 0, 128).rgb_milli(), [1000, 0, 501]);
        assert_eq!(Color::rgba(0, 0, 0, 127).alpha_milli(), 498);
    }

    #[test]
    fn paper_size_converts_centimetres_to_points() {
        let size = Size::from_cm(2.54, 5.08);
        assert!((size.width - 72.0).abs() < 1e-4);
        assert!((size.height - 144.0).abs() < 1e-4);
        assert_eq!(size.landscape().width, size.height);
    }

    #[test]
    fn transform_composition_applies_left_to_right() {
        let t = Transform::scale(2.0, 3.0).then(Transform::translate(10.0, 20.0));
        assert_eq!(t.apply(1.0, 1.0), (12.0, 23.0));
        let r = Transform::rotate(std::f64::consts::FRAC_PI_2);
        let (x, y) = r.apply(1.0, 0.0);
        assert!(x.abs() < 1e-12 && (y - 1.0).abs() < 1e-12);
    }
}
