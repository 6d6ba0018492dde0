/// A numeric sample kind an [`Image`](crate::image::Image) can hold.
///
/// The set is closed: `u8`, `i32` and `f32`. Each kind carries the range
/// interpolated values are clamped to before being stored.
pub trait Pixel: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Smallest representable sample.
    const MIN_VAL: Self;
    /// Largest representable sample.
    const MAX_VAL: Self;

    fn to_f32(self) -> f32;

    /// Converts back from the interpolation domain, clamping to
    /// `[MIN_VAL, MAX_VAL]` and rounding integer kinds to the nearest value.
    fn from_f32(value: f32) -> Self;

    fn is_zero(self) -> bool {
        self == Self::default()
    }
}

impl Pixel for u8 {
    const MIN_VAL: u8 = u8::MIN;
    const MAX_VAL: u8 = u8::MAX;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(value: f32) -> u8 {
        if value.is_nan() {
            return 0;
        }
        value.round().clamp(Self::MIN_VAL as f32, Self::MAX_VAL as f32) as u8
    }
}

impl Pixel for i32 {
    const MIN_VAL: i32 = i32::MIN;
    const MAX_VAL: i32 = i32::MAX;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(value: f32) -> i32 {
        if value.is_nan() {
            return 0;
        }
        // `as` saturates at the i32 bounds.
        value.round() as i32
    }
}

impl Pixel for f32 {
    const MIN_VAL: f32 = f32::MIN;
    const MAX_VAL: f32 = f32::MAX;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> f32 {
        value.clamp(Self::MIN_VAL, Self::MAX_VAL)
    }
}
