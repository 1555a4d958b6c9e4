//! Message payloads, combiners and the inbox iterator handed to steps.
//!
//! A combiner reduces all messages bound for one node within a superstep to a
//! single value. Reduction happens as messages arrive, from whichever worker
//! sends them, so the result is only independent of thread count and
//! scheduling when the combiner is associative and commutative. That is a
//! precondition on the caller; the engine does not check it.

use serde::{Deserialize, Serialize};
use smallvec::Drain;

/// Built-in message reduction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinerKind {
    /// Keep every message.
    #[default]
    None,
    Sum,
    Min,
    Max,
    /// Keep whichever message arrived first. Only deterministic when all
    /// messages to a node are equal.
    First,
}

impl CombinerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CombinerKind::None => "none",
            CombinerKind::Sum => "sum",
            CombinerKind::Min => "min",
            CombinerKind::Max => "max",
            CombinerKind::First => "first",
        }
    }
}

impl std::fmt::Display for CombinerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CombinerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CombinerKind::None),
            "sum" => Ok(CombinerKind::Sum),
            "min" => Ok(CombinerKind::Min),
            "max" => Ok(CombinerKind::Max),
            "first" => Ok(CombinerKind::First),
            other => Err(format!(
                "unknown combiner '{other}', expected none/sum/min/max/first"
            )),
        }
    }
}

/// A message payload.
///
/// Custom payloads implement this with the defaults, which support only
/// [`CombinerKind::None`] and [`CombinerKind::First`]. Numeric primitives
/// support every kind.
pub trait Message: Clone + Send + Sync + 'static {
    /// Whether [`reduce`](Self::reduce) is defined for `kind`.
    fn supports(kind: CombinerKind) -> bool {
        matches!(kind, CombinerKind::None | CombinerKind::First)
    }

    /// Reduces two messages bound for the same node. Only called for kinds
    /// other than `None` for which [`supports`](Self::supports) is true.
    fn reduce(kind: CombinerKind, current: Self, incoming: Self) -> Self {
        let _ = (kind, incoming);
        current
    }
}

macro_rules! impl_integer_message {
    ($($t:ty),*) => {$(
        impl Message for $t {
            fn supports(_kind: CombinerKind) -> bool {
                true
            }

            fn reduce(kind: CombinerKind, current: Self, incoming: Self) -> Self {
                match kind {
                    CombinerKind::Sum => current.wrapping_add(incoming),
                    CombinerKind::Min => current.min(incoming),
                    CombinerKind::Max => current.max(incoming),
                    CombinerKind::First | CombinerKind::None => current,
                }
            }
        }
    )*};
}

macro_rules! impl_float_message {
    ($($t:ty),*) => {$(
        impl Message for $t {
            fn supports(_kind: CombinerKind) -> bool {
                true
            }

            fn reduce(kind: CombinerKind, current: Self, incoming: Self) -> Self {
                match kind {
                    CombinerKind::Sum => current + incoming,
                    CombinerKind::Min => current.min(incoming),
                    CombinerKind::Max => current.max(incoming),
                    CombinerKind::First | CombinerKind::None => current,
                }
            }
        }
    )*};
}

impl_integer_message!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
impl_float_message!(f32, f64);

impl Message for pregel_core::NodeId {
    fn supports(kind: CombinerKind) -> bool {
        !matches!(kind, CombinerKind::Sum)
    }

    fn reduce(kind: CombinerKind, current: Self, incoming: Self) -> Self {
        match kind {
            CombinerKind::Min => current.min(incoming),
            CombinerKind::Max => current.max(incoming),
            _ => current,
        }
    }
}

/// A user-defined message combiner. Must be associative and commutative.
pub trait Combiner<M>: Send + Sync {
    fn combine(&self, current: M, incoming: M) -> M;
}

impl<M, F> Combiner<M> for F
where
    F: Fn(M, M) -> M + Send + Sync,
{
    fn combine(&self, current: M, incoming: M) -> M {
        self(current, incoming)
    }
}

/// How the message store treats several messages to one node.
pub(crate) enum Reduction<'c, M> {
    Keep,
    Builtin(CombinerKind),
    Custom(&'c dyn Combiner<M>),
}

impl<M: Message> Reduction<'_, M> {
    pub(crate) fn is_combining(&self) -> bool {
        !matches!(self, Reduction::Keep)
    }

    #[inline]
    pub(crate) fn apply(&self, current: M, incoming: M) -> M {
        match self {
            Reduction::Keep => current,
            Reduction::Builtin(kind) => M::reduce(*kind, current, incoming),
            Reduction::Custom(combiner) => combiner.combine(current, incoming),
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Reduction::Keep => "none",
            Reduction::Builtin(kind) => kind.as_str(),
            Reduction::Custom(_) => "custom",
        }
    }
}

/// Inline capacity of a node's inbox before it spills to the heap.
pub(crate) const INLINE_MESSAGES: usize = 2;

pub(crate) type InboxBuffer<M> = smallvec::SmallVec<[M; INLINE_MESSAGES]>;

/// Messages delivered to a node for the current superstep.
///
/// Draining the iterator empties the node's inbox slot while keeping its
/// capacity for reuse. Messages not consumed by the step are discarded.
pub struct Messages<'a, M> {
    inner: Option<Drain<'a, [M; INLINE_MESSAGES]>>,
}

impl<'a, M> Messages<'a, M> {
    pub(crate) fn new(buffer: &'a mut InboxBuffer<M>) -> Self {
        Messages {
            inner: Some(buffer.drain(..)),
        }
    }

    /// An empty inbox.
    pub fn empty() -> Self {
        Messages { inner: None }
    }
}

impl<M> Iterator for Messages<'_, M> {
    type Item = M;

    fn next(&mut self) -> Option<M> {
        self.inner.as_mut()?.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Some(drain) => drain.size_hint(),
            None => (0, Some(0)),
        }
    }
}

impl<M> ExactSizeIterator for Messages<'_, M> {}
