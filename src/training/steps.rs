use crate::error::{ChexNetError, Result};

/// Token that derives the step count from the dataset size
pub const AUTO: &str = "auto";

/// Resolve a configured `train_steps` / `validation_steps` token
///
/// `auto` yields `floor(total_count / batch_size)`; anything else must be a
/// non-negative integer.
pub fn resolve_steps(field: &str, token: &str, total_count: usize, batch_size: usize) -> Result<usize> {
    if batch_size == 0 {
        return Err(ChexNetError::invalid("batch_size", "0", "a positive integer"));
    }

    let token = token.trim();
    if token == AUTO {
        return Ok(total_count / batch_size);
    }

    token
        .parse::<usize>()
        .map_err(|_| ChexNetError::invalid(field, token, "'auto' or specify an integer"))
}
