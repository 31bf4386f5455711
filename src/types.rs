use fixed::types::I32F32;

/// PDF point (1/72 inch). Values are snapped to whole milli-points on the
/// way in so widths and offsets compare exactly.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::ZERO);

    /// Non-finite input becomes zero.
    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        Pt::from_milli((f64::from(value) * 1000.0).round())
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        (self.0.to_num::<f64>() * 1000.0).round() as i64
    }

    /// `self * num / denom`, rounded half away from zero to a milli-point.
    /// Font advances are scaled with `denom = 1000` (units per em).
    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let scaled = i128::from(self.to_milli_i64()).saturating_mul(i128::from(num));
        Pt::from_milli(div_round(scaled, i128::from(denom)) as f64)
    }

    fn from_milli(milli: f64) -> Pt {
        Pt(I32F32::saturating_from_num(milli / 1000.0))
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::Mul<f32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: f32) -> Pt {
        Pt::from_f32(self.to_f32() * rhs)
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        if rhs == 0 {
            return Pt::ZERO;
        }
        Pt::from_milli(div_round(i128::from(self.to_milli_i64()), i128::from(rhs)) as f64)
    }
}

fn div_round(num: i128, den: i128) -> i128 {
    let half = den.abs() / 2;
    if (num >= 0) == (den > 0) {
        (num.abs() + half) / den.abs()
    } else {
        -((num.abs() + half) / den.abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
        }
    }

    pub fn letter() -> Self {
        // 8.5in x 11in at 72pt/in.
        Self::new(612.0, 792.0)
    }
}

/// RGB fill color. Channels are nominally 0..1 but are not clamped here;
/// out-of-range values go to the PDF content stream as given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milli_round_trip_is_exact() {
        assert_eq!(Pt::from_f32(303.7).to_milli_i64(), 303_700);
        assert_eq!(Pt::from_f32(-12.5).to_milli_i64(), -12_500);
    }

    #[test]
    fn mul_ratio_scales_thousandths() {
        let width = Pt::from_f32(45.0).mul_ratio(4280, 1000);
        assert_eq!(width.to_milli_i64(), 192_600);
        assert_eq!((width / 2).to_milli_i64(), 96_300);
    }

    #[test]
    fn centering_offset_subtracts_exactly() {
        let anchor = Pt::from_f32(400.0);
        let half = Pt::from_f32(45.0).mul_ratio(4280, 1000) / 2;
        assert_eq!((anchor - half).to_milli_i64(), 303_700);
        assert_eq!((Pt::from_f32(7.0) / -2).to_milli_i64(), -3_500);
    }

    #[test]
    fn non_finite_values_collapse_to_zero() {
        assert_eq!(Pt::from_f32(f32::NAN), Pt::ZERO);
        assert_eq!(Pt::from_f32(10.0) * f32::INFINITY, Pt::ZERO);
    }
}
