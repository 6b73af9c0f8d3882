//! Host-side launch drivers, one per operation family.
//!
//! Every driver is the same fixed recipe: plan the split, acquire a pool,
//! load the program, stage arguments (partitioned inputs scattered, shared
//! operands broadcast, parameter blocks broadcast exactly), launch, read
//! back partials or sharded outputs, combine on the host, release. A driver
//! either returns a fully-populated result or fails with no partial output
//! guaranteed meaningful — and the pool is released on every path either
//! way.

pub mod dot;
pub mod gemm;
pub mod gemv;
pub mod resident;
pub mod softmax;

pub use dot::{dot, dot_planes, DotElement};
pub use gemm::gemm;
pub use gemv::gemv;
pub use resident::{GemvElement, ResidentMatrix};
pub use softmax::softmax;
