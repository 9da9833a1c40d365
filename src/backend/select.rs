// Capability selection
//
// Device, queue family and format choices all follow the same shape: walk the
// candidates the driver reports and keep the first one that qualifies.

/// Returns the first `Some` produced by `qualify`, stopping early on error.
///
/// Checks may query the driver, so they are fallible; an error aborts the
/// search instead of being treated as "does not qualify".
pub fn select_first<T, U, E>(
    candidates: impl IntoIterator<Item = T>,
    mut qualify: impl FnMut(T) -> Result<Option<U>, E>,
) -> Result<Option<U>, E> {
    for candidate in candidates {
        if let Some(found) = qualify(candidate)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
