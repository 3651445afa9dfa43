//! The closed set of callback shapes a promise knows how to drive, and the
//! classifier that maps a declared [`Signature`] onto exactly one of them.
//!
//! A shape is decided once, when a callback is handed to a promise or to a
//! chaining operator. Each operator only accepts a subset of shapes; asking
//! for a shape outside that subset is a configuration error returned at the
//! call site.
use std::fmt;
use std::sync::OnceLock;

use crate::error::Error;

/// One declared input parameter of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    /// A single value.
    Value,
    /// Any number of values, as one list.
    Values,
    /// The incoming rejection reason.
    Error,
    /// Continuation accepting zero or more values.
    Resolve,
    /// Continuation accepting no values.
    Complete,
    /// Continuation accepting one error.
    Reject,
}

/// One declared output of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ret {
    Value,
    Values,
    Error,
    Promise,
}

/// The declared parameter and result structure of a callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    inputs: Vec<Param>,
    outputs: Vec<Ret>,
}

impl Signature {
    pub fn new(inputs: Vec<Param>, outputs: Vec<Ret>) -> Self {
        Self { inputs, outputs }
    }

    pub fn inputs(&self) -> &[Param] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Ret] {
        &self.outputs
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn({})", join(&self.inputs))?;
        match self.outputs.len() {
            0 => Ok(()),
            1 => write!(f, " -> {:?}", self.outputs[0]),
            _ => write!(f, " -> ({})", join(&self.outputs)),
        }
    }
}

fn join<T: fmt::Debug>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("{:?}", item))
        .collect::<Vec<_>>()
        .join(", ")
}

/// What a direct callback takes as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inputs {
    None,
    Values,
    Error,
}

/// What a direct callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outputs {
    Nothing,
    Error,
    ValueError,
    ValuesError,
    Promise,
    PromiseError,
}

impl Outputs {
    pub const ALL: [Outputs; 6] = [
        Outputs::Nothing,
        Outputs::Error,
        Outputs::ValueError,
        Outputs::ValuesError,
        Outputs::Promise,
        Outputs::PromiseError,
    ];

    fn rets(self) -> &'static [Ret] {
        match self {
            Outputs::Nothing => &[],
            Outputs::Error => &[Ret::Error],
            Outputs::ValueError => &[Ret::Value, Ret::Error],
            Outputs::ValuesError => &[Ret::Values, Ret::Error],
            Outputs::Promise => &[Ret::Promise],
            Outputs::PromiseError => &[Ret::Promise, Ret::Error],
        }
    }
}

/// What precedes (or follows) the resolve/reject pair of a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Continuation {
    /// `(resolve, reject)`
    Bare,
    /// `(value, resolve, reject)`
    Value,
    /// `(value, complete, reject)`, resolving without values.
    ValueComplete,
    /// `(resolve, reject, values)`
    Variadic,
    /// `(error, resolve, reject)`
    Error,
}

impl Continuation {
    pub const ALL: [Continuation; 5] = [
        Continuation::Bare,
        Continuation::Value,
        Continuation::ValueComplete,
        Continuation::Variadic,
        Continuation::Error,
    ];

    fn params(self) -> &'static [Param] {
        match self {
            Continuation::Bare => &[Param::Resolve, Param::Reject],
            Continuation::Value => &[Param::Value, Param::Resolve, Param::Reject],
            Continuation::ValueComplete => &[Param::Value, Param::Complete, Param::Reject],
            Continuation::Variadic => &[Param::Resolve, Param::Reject, Param::Values],
            Continuation::Error => &[Param::Error, Param::Resolve, Param::Reject],
        }
    }
}

/// The family a shape belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Direct,
    Continuation,
    ErrorFirst,
}

/// A recognized calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Direct { inputs: Inputs, outputs: Outputs },
    Continuation(Continuation),
}

impl Shape {
    pub const fn direct(inputs: Inputs, outputs: Outputs) -> Self {
        Shape::Direct { inputs, outputs }
    }

    pub fn family(self) -> Family {
        match self {
            Shape::Direct {
                inputs: Inputs::Error,
                ..
            } => Family::ErrorFirst,
            Shape::Direct { .. } => Family::Direct,
            Shape::Continuation(_) => Family::Continuation,
        }
    }

    pub fn uses_continuations(self) -> bool {
        matches!(self, Shape::Continuation(_))
    }

    /// Whether the callback needs an incoming rejection reason to run.
    pub fn takes_error(self) -> bool {
        matches!(
            self,
            Shape::Direct {
                inputs: Inputs::Error,
                ..
            } | Shape::Continuation(Continuation::Error)
        )
    }

    /// The structural test a signature must pass to have this shape.
    fn accepts(self, signature: &Signature) -> bool {
        let (inputs, outputs) = (signature.inputs(), signature.outputs());
        match self {
            Shape::Continuation(kind) => outputs.is_empty() && inputs == kind.params(),
            Shape::Direct {
                inputs: expected,
                outputs: returns,
            } => {
                outputs == returns.rets()
                    && match expected {
                        Inputs::None => inputs.is_empty(),
                        Inputs::Values => value_inputs(inputs),
                        Inputs::Error => inputs == [Param::Error],
                    }
            }
        }
    }
}

/// One or more single values, optionally closed by a variadic list.
fn value_inputs(inputs: &[Param]) -> bool {
    match inputs.split_last() {
        Some((Param::Values, head)) | Some((Param::Value, head)) => {
            head.iter().all(|param| *param == Param::Value)
        }
        _ => false,
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Direct { inputs, outputs } => match self.family() {
                Family::ErrorFirst => write!(f, "error-first {:?}", outputs),
                _ => write!(f, "direct {:?} -> {:?}", inputs, outputs),
            },
            Shape::Continuation(kind) => write!(f, "continuation {:?}", kind),
        }
    }
}

/// Shapes accepted by each operation.
pub mod allow {
    use super::{Continuation, Inputs, Outputs, Shape};

    const fn direct(inputs: Inputs, outputs: Outputs) -> Shape {
        Shape::direct(inputs, outputs)
    }

    const fn cont(kind: Continuation) -> Shape {
        Shape::Continuation(kind)
    }

    const fn every_output(inputs: Inputs) -> [Shape; 6] {
        [
            direct(inputs, Outputs::Nothing),
            direct(inputs, Outputs::Error),
            direct(inputs, Outputs::ValueError),
            direct(inputs, Outputs::ValuesError),
            direct(inputs, Outputs::Promise),
            direct(inputs, Outputs::PromiseError),
        ]
    }

    const NULLARY: [Shape; 6] = every_output(Inputs::None);
    const VALUES: [Shape; 6] = every_output(Inputs::Values);
    const ERROR_FIRST: [Shape; 6] = every_output(Inputs::Error);

    /// Promise construction: anything not waiting on an incoming error.
    pub const NEW: &[Shape] = &[
        cont(Continuation::Bare),
        cont(Continuation::Value),
        cont(Continuation::ValueComplete),
        cont(Continuation::Variadic),
        NULLARY[0],
        NULLARY[1],
        NULLARY[2],
        NULLARY[3],
        NULLARY[4],
        NULLARY[5],
        VALUES[0],
        VALUES[1],
        VALUES[2],
        VALUES[3],
        VALUES[4],
        VALUES[5],
    ];

    pub const THEN: &[Shape] = &[
        cont(Continuation::Value),
        cont(Continuation::Variadic),
        NULLARY[0],
        NULLARY[1],
        NULLARY[2],
        NULLARY[3],
        NULLARY[4],
        NULLARY[5],
        VALUES[0],
        VALUES[1],
        VALUES[2],
        VALUES[3],
        VALUES[4],
        VALUES[5],
    ];

    pub const ON_REJECTED: &[Shape] = &ERROR_FIRST;

    pub const TAP: &[Shape] = &[
        cont(Continuation::ValueComplete),
        VALUES[0],
        VALUES[1],
        NULLARY[0],
        NULLARY[1],
    ];

    pub const SPREAD: &[Shape] = &[
        cont(Continuation::Variadic),
        VALUES[0],
        VALUES[1],
        VALUES[2],
        VALUES[3],
        VALUES[4],
        VALUES[5],
    ];

    pub const CATCH: &[Shape] = &[
        cont(Continuation::Error),
        ERROR_FIRST[0],
        ERROR_FIRST[1],
        ERROR_FIRST[2],
        ERROR_FIRST[3],
        ERROR_FIRST[4],
        ERROR_FIRST[5],
    ];

    pub const FINALLY: &[Shape] = &NULLARY;
}

/// Immutable, ordered table of every recognized shape.
///
/// Entries are tested in priority order: continuations, direct callbacks
/// without inputs, direct callbacks over values, then error-first callbacks.
/// The structural tests are mutually exclusive, so the order only matters
/// for speed.
#[derive(Debug)]
pub struct Catalog {
    entries: Vec<Shape>,
}

impl Catalog {
    pub fn new() -> Self {
        let entries = Continuation::ALL
            .into_iter()
            .map(Shape::Continuation)
            .chain(
                [Inputs::None, Inputs::Values, Inputs::Error]
                    .into_iter()
                    .flat_map(|inputs| {
                        Outputs::ALL
                            .into_iter()
                            .map(move |outputs| Shape::direct(inputs, outputs))
                    }),
            )
            .collect();
        Self { entries }
    }

    /// The process-wide catalog, built on first use.
    pub fn standard() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(Catalog::new)
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.entries
    }

    pub fn classify(&self, signature: &Signature) -> Result<Shape, Error> {
        self.entries
            .iter()
            .copied()
            .find(|shape| shape.accepts(signature))
            .ok_or_else(|| Error::UnrecognizedShape {
                signature: signature.to_string(),
            })
    }

    /// Classifies `signature` against the `allowed` subset only, on behalf
    /// of `operation`.
    pub fn classify_among(
        &self,
        signature: &Signature,
        allowed: &[Shape],
        operation: &'static str,
    ) -> Result<Shape, Error> {
        if let Some(shape) = allowed.iter().copied().find(|shape| shape.accepts(signature)) {
            return Ok(shape);
        }
        let shape = self.classify(signature)?;
        Err(Error::ShapeNotAllowed { operation, shape })
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
