//! Representation for structure (ports and resource instances) in a CAC
//! module.

use crate::{InstIdx, ModIdx};
use cac_utils::{GetName, Id};
use std::hash::{Hash, Hasher};

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The port is a sink: something inside the enclosing module drives it.
    Input,
    /// The port is a source: it can drive sinks inside the enclosing module.
    Output,
}

impl Direction {
    /// Return the direction opposite to this one.
    pub fn reverse(self) -> Self {
        match self {
            Direction::Input => Direction::Output,
            Direction::Output => Direction::Input,
        }
    }
}

/// A port declaration on a module.
///
/// Directions are stored from the *inside* view: a port the caller drives is
/// stored as [`Direction::Output`] because, seen from inside the module, it
/// is a source. The Verilog backend flips the direction back at the module
/// header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDef {
    pub name: Id,
    pub width: u64,
    pub direction: Direction,
}

impl PortDef {
    pub fn new<S: Into<Id>>(name: S, width: u64, direction: Direction) -> Self {
        assert!(width >= 1, "port width must be at least 1");
        Self {
            name: name.into(),
            width,
            direction,
        }
    }
}

/// The anchor of a port reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortParent {
    /// A port declared on the enclosing module itself.
    This,
    /// A port on a resource instance inside the enclosing module.
    Inst(InstIdx),
}

/// A reference to a port, viewed from inside an enclosing module.
///
/// The `width`, `direction`, and `sensitive` fields are caches of the
/// declaring module's metadata, resolved at creation time. `direction` is
/// the usage view: [`Direction::Output`] ports are sources and
/// [`Direction::Input`] ports are sinks. Two ports are equal iff they name
/// the same `(parent, name)` pair.
#[derive(Debug, Clone, Copy)]
pub struct Port {
    pub parent: PortParent,
    pub name: Id,
    pub width: u64,
    pub direction: Direction,
    /// The declaring module records a default value for this port.
    pub sensitive: bool,
}

impl Port {
    /// True iff this port can drive a sink.
    pub fn is_source(&self) -> bool {
        self.direction == Direction::Output
    }

    /// True iff this port is driven from inside the enclosing module.
    pub fn is_sink(&self) -> bool {
        self.direction == Direction::Input
    }

    /// The instance this port belongs to, if any.
    pub fn instance(&self) -> Option<InstIdx> {
        match self.parent {
            PortParent::This => None,
            PortParent::Inst(i) => Some(i),
        }
    }
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.parent == other.parent && self.name == other.name
    }
}

impl Eq for Port {}

impl Hash for Port {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parent.hash(state);
        self.name.hash(state);
    }
}

/// A concrete resource inside a module: an immutable back-reference to the
/// source module plus a locally unique name.
#[derive(Debug, Clone)]
pub struct Instance {
    name: Id,
    /// The module this instance was created from.
    pub source: ModIdx,
    pub(crate) live: bool,
}

impl Instance {
    pub(crate) fn new(name: Id, source: ModIdx) -> Self {
        Self {
            name,
            source,
            live: true,
        }
    }
}

impl GetName for Instance {
    fn name(&self) -> Id {
        self.name
    }
}

/// A compile-time-fixed `output -> input` wiring, emitted as a continuous
/// assign in RTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralConnection {
    pub src: Port,
    pub dst: Port,
}
