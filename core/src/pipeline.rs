//! Multi-phase tree reductions.
//!
//! # Why Phases?
//!
//! Some reductions cannot be computed in one pass. Softmax needs the global
//! maximum before any exponential can be taken, and the global sum of those
//! exponentials before any element can be normalized — three launches with a
//! hard ordering dependency between them. The pattern generalizes to any
//! two- or three-phase tree reduction: each phase is a full launch of its
//! own program, parameterized by the previous phase's reduced scalar.
//!
//! The ordering is strict by construction: [`run_phases`] broadcasts a
//! phase's parameter only after the previous phase's partials have been
//! gathered and combined on the host. Units never share mutable scalar
//! state — every unit writes its partial into its own slot and the host
//! performs the cross-unit combine.

use tracing::trace;

use crate::elem::EngineElem;
use crate::error::Result;
use crate::pool::{UnitBackend, UnitPool};
use crate::transfer::Mode;

/// Host-side combine applied to per-unit partial results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combine {
    Sum,
    Max,
}

impl Combine {
    /// Folds a partial-result vector into one scalar.
    pub fn fold<T: EngineElem>(&self, partials: &[T]) -> T {
        match self {
            Combine::Sum => partials.iter().fold(T::zero(), |acc, &p| acc + p),
            Combine::Max => match partials.split_first() {
                Some((&first, rest)) => {
                    rest.iter().fold(first, |acc, &p| if p > acc { p } else { acc })
                }
                None => T::zero(),
            },
        }
    }
}

/// One stage of a multi-phase reduction.
#[derive(Clone, Copy, Debug)]
pub struct Phase<T> {
    /// Program to bind for this phase.
    pub program: &'static str,
    /// Symbol receiving the previous phase's combined scalar, if any.
    pub param: Option<&'static str>,
    /// Per-unit partial-result symbol and its combine rule, if any.
    pub partial: Option<(&'static str, Combine)>,
    /// Marker tying the phase sequence to one scalar type.
    pub _marker: std::marker::PhantomData<T>,
}

impl<T> Phase<T> {
    pub fn new(
        program: &'static str,
        param: Option<&'static str>,
        partial: Option<(&'static str, Combine)>,
    ) -> Self {
        Self {
            program,
            param,
            partial,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Runs a phase sequence to completion, threading each phase's combined
/// scalar into the next phase's parameter.
///
/// Phase *k+1* does not begin staging its broadcast parameter until phase
/// *k*'s partials have been fully gathered and combined — a hard ordering
/// dependency, not an optimization opportunity. Units run freely in
/// parallel only within a phase.
///
/// Returns the last combined scalar, if any phase produced one.
pub fn run_phases<T: EngineElem, B: UnitBackend>(
    pool: &mut UnitPool<B>,
    phases: &[Phase<T>],
    mut carried: Option<T>,
) -> Result<Option<T>> {
    for phase in phases {
        pool.load(phase.program)?;
        if let Some(symbol) = phase.param {
            let value = carried.expect("phase expects a scalar from a previous combine");
            pool.broadcast_exact(symbol, 0, &value, Mode::Async)?;
        }
        pool.launch(Mode::Sync)?;

        if let Some((symbol, combine)) = phase.partial {
            let mut partials = vec![T::zero(); pool.unit_count()];
            pool.copy_each(symbol, &mut partials)?;
            let folded = combine.fold(&partials);
            trace!(program = phase.program, ?combine, "phase combined");
            carried = Some(folded);
        }
    }
    Ok(carried)
}
