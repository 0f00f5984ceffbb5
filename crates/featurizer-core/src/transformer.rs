//! Execute/flush transformer protocol.
//!
//! A transformer receives input through `execute` and reports results through
//! a callback rather than a return value, so streaming transforms can emit
//! zero, one or many outputs per input. `flush` marks end of input and lets a
//! streaming transform drain whatever it buffered. Batch transforms emit
//! exactly once from `execute` and nothing from `flush`, but callers still
//! run both phases.
//!
//! Callbacks are fallible. A sink that refuses an emission returns an error,
//! and the transformer must propagate it unchanged.

use crate::error::Result;

/// Sink a transformer emits its results into.
pub type Callback<'c, O> = dyn FnMut(O) -> Result<()> + 'c;

/// A pretrained transform driven through the execute/flush protocol.
///
/// `I` is the input type accepted by `execute`, typically a borrowed view.
pub trait Transformer<I> {
    /// Value handed to the callback.
    type Output;

    /// Process one input, emitting results through `callback`.
    fn execute(&mut self, input: I, callback: &mut Callback<'_, Self::Output>) -> Result<()>;

    /// Signal end of input, emitting any buffered results through `callback`.
    fn flush(&mut self, callback: &mut Callback<'_, Self::Output>) -> Result<()>;
}
