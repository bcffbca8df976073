//! In-memory representation of a CAC module.

use crate::{
    Activation, Direction, IndexRef, InstIdx, Instance, InstrIdx, Instruction,
    ModIdx, Operation, Port, PortDef, PortParent, Prototype,
    StructuralConnection,
};
use cac_utils::{CacResult, Error, GetName, Id, NameGenerator};
use linked_hash_map::LinkedHashMap;

/// A named unit owning a set of resource instances, a set of
/// connect-and-continue instructions, a list of structural connections, a map
/// of actions, primitive ports, and default-value metadata.
///
/// Instances and instructions live in append-only arenas; deletion
/// tombstones a slot instead of compacting so that indices held by a running
/// pass stay valid.
#[derive(Debug)]
pub struct Module {
    name: Id,
    idx: ModIdx,
    /// Port declarations, stored from the inside view (see [`PortDef`]).
    pub ports: LinkedHashMap<Id, PortDef>,
    /// Reset defaults; presence marks the port sensitive.
    pub defaults: LinkedHashMap<Id, u64>,
    pub(crate) instances: Vec<Instance>,
    pub(crate) instrs: Vec<Instruction>,
    pub structural: Vec<StructuralConnection>,
    pub(crate) actions: LinkedHashMap<Id, ModIdx>,
    /// Present iff this module is a primitive black-box.
    pub prototype: Option<Prototype>,
    /// The module was created with implicit `clk`/`rst` ports.
    pub is_sequential: bool,
    /// True for modules registered as an action of another module.
    pub(crate) is_action: bool,
    /// For calling conventions: which of this module's ports stand for
    /// ports of the invoked resource (CC port name -> resource port name).
    pub(crate) bound_ports: LinkedHashMap<Id, Id>,
    namegen: NameGenerator,
}

impl Module {
    pub(crate) fn new(name: Id, idx: ModIdx, is_sequential: bool) -> Self {
        Self {
            name,
            idx,
            ports: LinkedHashMap::new(),
            defaults: LinkedHashMap::new(),
            instances: Vec::new(),
            instrs: Vec::new(),
            structural: Vec::new(),
            actions: LinkedHashMap::new(),
            prototype: None,
            is_sequential,
            is_action: false,
            bound_ports: LinkedHashMap::new(),
            namegen: NameGenerator::default(),
        }
    }

    /// Grants immutable access to the name of this module.
    pub fn name(&self) -> Id {
        self.name
    }

    /// The index of this module in its context.
    pub fn idx(&self) -> ModIdx {
        self.idx
    }

    pub fn is_primitive(&self) -> bool {
        self.prototype.is_some()
    }

    pub fn is_action(&self) -> bool {
        self.is_action
    }

    // =============== Ports ===============

    /// Declare a port the caller drives. Stored as [`Direction::Output`]
    /// because the port is a source when seen from inside.
    pub fn add_in_port<S: Into<Id>>(
        &mut self,
        name: S,
        width: u64,
    ) -> CacResult<()> {
        self.add_port(name.into(), width, Direction::Output)
    }

    /// Declare a port the caller reads. Stored as [`Direction::Input`].
    pub fn add_out_port<S: Into<Id>>(
        &mut self,
        name: S,
        width: u64,
    ) -> CacResult<()> {
        self.add_port(name.into(), width, Direction::Input)
    }

    fn add_port(
        &mut self,
        name: Id,
        width: u64,
        direction: Direction,
    ) -> CacResult<()> {
        if self.ports.contains_key(&name) {
            return Err(Error::already_bound(
                name,
                format!("port on module `{}'", self.name),
            ));
        }
        self.ports.insert(name, PortDef::new(name, width, direction));
        Ok(())
    }

    /// Reference to this module's own port, if declared.
    pub fn find_pt<S>(&self, name: S) -> Option<Port>
    where
        S: Into<Id>,
    {
        let name = name.into();
        self.ports.get(&name).map(|def| Port {
            parent: PortParent::This,
            name,
            width: def.width,
            direction: def.direction,
            sensitive: self.defaults.contains_key(&name),
        })
    }

    /// Reference to this module's own port; undefined names are fatal.
    pub fn pt<S>(&self, name: S) -> CacResult<Port>
    where
        S: Into<Id>,
    {
        let name = name.into();
        self.find_pt(name).ok_or_else(|| {
            Error::undefined(name, format!("port on module `{}'", self.name))
        })
    }

    /// Install a reset default for `port`, marking it sensitive.
    pub fn set_default<S: Into<Id>>(
        &mut self,
        port: S,
        value: u64,
    ) -> CacResult<()> {
        let port = port.into();
        if !self.ports.contains_key(&port) {
            return Err(Error::undefined(
                port,
                format!("port on module `{}'", self.name),
            ));
        }
        self.defaults.insert(port, value);
        Ok(())
    }

    // =============== Instances ===============

    /// Add a resource instance with an exact name. Duplicate names are fatal.
    pub fn add_instance<S: Into<Id>>(
        &mut self,
        source: ModIdx,
        name: S,
    ) -> CacResult<InstIdx> {
        let name = name.into();
        if self.find_instance(name).is_some() {
            return Err(Error::already_bound(
                name,
                format!("instance in module `{}'", self.name),
            ));
        }
        let idx = InstIdx::new(self.instances.len());
        self.instances.push(Instance::new(name, source));
        self.namegen.add_names([name].into_iter().collect());
        Ok(idx)
    }

    /// Construct a non-conflicting instance name from `prefix`.
    pub fn generate_name<S: Into<Id>>(&mut self, prefix: S) -> Id {
        self.namegen.gen_name(prefix)
    }

    pub fn instance(&self, idx: InstIdx) -> &Instance {
        &self.instances[idx.index()]
    }

    /// Find a live instance by name.
    pub fn find_instance<S: Into<Id>>(&self, name: S) -> Option<InstIdx> {
        let name = name.into();
        self.instances
            .iter()
            .position(|inst| inst.live && inst.name() == name)
            .map(InstIdx::new)
    }

    /// Iterate over live instances.
    pub fn instances(&self) -> impl Iterator<Item = (InstIdx, &Instance)> {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.live)
            .map(|(i, inst)| (InstIdx::new(i), inst))
    }

    /// Tombstone an instance. Every instruction referencing the instance
    /// must already have been emptied.
    pub fn remove_instance(&mut self, idx: InstIdx) {
        self.instances[idx.index()].live = false;
    }

    // =============== Instructions ===============

    /// Append an instruction to the arena. Passes use this to insert
    /// rewritten clones; fresh instructions come from the
    /// [`Builder`](crate::Builder).
    pub fn add_instr(&mut self, instr: Instruction) -> InstrIdx {
        let idx = InstrIdx::new(self.instrs.len());
        self.instrs.push(instr);
        idx
    }

    pub fn instr(&self, idx: InstrIdx) -> &Instruction {
        &self.instrs[idx.index()]
    }

    pub fn instr_mut(&mut self, idx: InstrIdx) -> &mut Instruction {
        &mut self.instrs[idx.index()]
    }

    /// Iterate over live instructions.
    pub fn instrs(&self) -> impl Iterator<Item = (InstrIdx, &Instruction)> {
        self.instrs
            .iter()
            .enumerate()
            .filter(|(_, instr)| instr.live)
            .map(|(i, instr)| (InstrIdx::new(i), instr))
    }

    /// Indices of live instructions, collected so the module can be mutated
    /// while walking them.
    pub fn instr_indices(&self) -> Vec<InstrIdx> {
        self.instrs().map(|(i, _)| i).collect()
    }

    /// Tombstone an instruction. The caller must have retargeted or dropped
    /// every edge pointing at it.
    pub fn remove_instr(&mut self, idx: InstrIdx) {
        let instr = &mut self.instrs[idx.index()];
        instr.live = false;
        instr.continuations.clear();
    }

    /// Empty every live instruction that mentions a port on `inst` and drop
    /// structural connections touching it. Used before erasing a resource.
    pub fn disconnect_instance(&mut self, inst: InstIdx) {
        for instr in self.instrs.iter_mut().filter(|i| i.live) {
            let mentions = instr
                .ports()
                .iter()
                .any(|p| p.instance() == Some(inst));
            if mentions {
                instr.erase();
                instr
                    .continuations
                    .retain(|act| act.cond.instance() != Some(inst));
            }
        }
        self.structural.retain(|sc| {
            sc.src.instance() != Some(inst) && sc.dst.instance() != Some(inst)
        });
    }

    /// Predecessor edges of `target`: every `(instr, activation)` pair whose
    /// destination is `target`.
    pub fn predecessors(
        &self,
        target: InstrIdx,
    ) -> Vec<(InstrIdx, Activation)> {
        self.instrs()
            .flat_map(|(i, instr)| {
                instr
                    .continuations
                    .iter()
                    .filter(|act| act.dest == target)
                    .map(move |act| (i, *act))
            })
            .collect()
    }

    /// The set of connect instructions writing `port`.
    pub fn writers(&self, port: &Port) -> Vec<InstrIdx> {
        self.instrs()
            .filter(|(_, instr)| {
                matches!(&instr.op, Operation::Connect { dst, .. } if dst == port)
            })
            .map(|(i, _)| i)
            .collect()
    }

    // =============== Actions ===============

    /// Register `cc` as the calling convention for `name`. Exactly one
    /// sub-module may be registered per action name.
    pub(crate) fn add_action(&mut self, name: Id, cc: ModIdx) -> CacResult<()> {
        if self.actions.contains_key(&name) {
            return Err(Error::already_bound(
                name,
                format!("action on module `{}'", self.name),
            ));
        }
        self.actions.insert(name, cc);
        Ok(())
    }

    pub fn find_action<S: Into<Id>>(&self, name: S) -> Option<ModIdx> {
        self.actions.get(&name.into()).copied()
    }

    pub fn get_action<S: Into<Id>>(&self, name: S) -> CacResult<ModIdx> {
        let name = name.into();
        self.find_action(name).ok_or_else(|| {
            Error::undefined(name, format!("action on module `{}'", self.name))
        })
    }

    pub fn actions(&self) -> impl Iterator<Item = (Id, ModIdx)> + '_ {
        self.actions.iter().map(|(name, idx)| (*name, *idx))
    }

    pub fn num_actions(&self) -> usize {
        self.actions.len()
    }
}

impl GetName for Module {
    fn name(&self) -> Id {
        self.name()
    }
}
