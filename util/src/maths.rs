//! Utility maths functions

/// Clamp a value into the range `[min, max]`.
///
/// Unlike `Ord::clamp` this also works on floats.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: PartialOrd,
{
    if value > max {
        max
    } else if value < min {
        min
    } else {
        value
    }
}
