//! Element trait for buffers crossing the transfer boundary.

use std::fmt::Debug;

use bytemuck::Pod;
use num_traits::{Num, NumAssign};

/// Trait bound for scalars the engine can plan, transfer and combine.
///
/// # Requirements
/// - `Pod`: every buffer crosses the host/unit boundary as raw bytes.
/// - `Num + NumAssign + PartialOrd`: host-side combines (sum, max).
/// - `Send + Sync`: drivers move buffers across host threads.
pub trait EngineElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + Pod + PartialOrd
{
}

impl<T> EngineElem for T where
    T: Num + NumAssign + Copy + Clone + Debug + Send + Sync + Pod + PartialOrd
{
}
