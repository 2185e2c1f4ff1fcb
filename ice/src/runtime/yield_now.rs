use super::context::current;

/// Yields to the reactor of the current context.
///
/// The calling computation is resumed by the dispatch loop once every
/// completion queued before it has been handled. Outside of a runtime this
/// returns immediately.
///
/// # Examples
///
/// ```rust,ignore
/// async fn busy() {
///     for chunk in work() {
///         process(chunk);
///         ice::yield_now().await;
///     }
/// }
/// ```
pub async fn yield_now() {
    if let Some(context) = current() {
        context.schedule().await;
    }
}
