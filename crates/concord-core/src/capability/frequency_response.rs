//! Argument validation for frequency response queries.

use crate::error::NativeError;

/// Rejects magnitude or phase arrays whose length differs from the
/// frequency array.
pub(crate) fn check_lengths(
    frequencies: usize,
    magnitude: usize,
    phase: usize,
) -> Result<(), NativeError> {
    if magnitude != frequencies || phase != frequencies {
        return Err(NativeError::invalid_access(format!(
            "frequency response arrays differ in length: {frequencies} frequencies, \
             {magnitude} magnitudes, {phase} phases"
        )));
    }
    Ok(())
}
