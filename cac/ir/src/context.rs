//! An IR context. This is the top-level object for an IR and contains all
//! information needed to transform, lower, and emit a program.

use crate::{IndexRef, InstIdx, ModIdx, Module, Port, PortParent};
use cac_utils::{CacResult, Error, GetName, Id};
use std::collections::HashMap;

/// Process-lifetime registry of named modules. Owns every module in an
/// append-only arena; modules are never destroyed.
#[derive(Default)]
pub struct Context {
    modules: Vec<Module>,
    names: HashMap<Id, ModIdx>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sequential module pre-declared with `clk` and `rst` input
    /// ports. Fails if `name` is already present.
    pub fn add_module<S: Into<Id>>(&mut self, name: S) -> CacResult<ModIdx> {
        let idx = self.add_raw_module(name.into(), true)?;
        let module = self.module_mut(idx);
        module.add_in_port("clk", 1)?;
        module.add_in_port("rst", 1)?;
        Ok(idx)
    }

    /// Create a combinational module without `clk`/`rst`.
    pub fn add_comb_module<S: Into<Id>>(
        &mut self,
        name: S,
    ) -> CacResult<ModIdx> {
        self.add_raw_module(name.into(), false)
    }

    fn add_raw_module(&mut self, name: Id, sequential: bool) -> CacResult<ModIdx> {
        if self.names.contains_key(&name) {
            return Err(Error::already_bound(name, "module in context"));
        }
        let idx = ModIdx::new(self.modules.len());
        self.modules.push(Module::new(name, idx, sequential));
        self.names.insert(name, idx);
        Ok(idx)
    }

    pub fn find_module<S: Into<Id>>(&self, name: S) -> Option<ModIdx> {
        self.names.get(&name.into()).copied()
    }

    /// Retrieve a module by name; unknown modules are fatal.
    pub fn get_module<S: Into<Id>>(&self, name: S) -> CacResult<ModIdx> {
        let name = name.into();
        self.find_module(name)
            .ok_or_else(|| Error::undefined(name, "module in context"))
    }

    pub fn module(&self, idx: ModIdx) -> &Module {
        &self.modules[idx.index()]
    }

    pub fn module_mut(&mut self, idx: ModIdx) -> &mut Module {
        &mut self.modules[idx.index()]
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    /// Indices of modules that get compiled and emitted: everything that is
    /// neither a primitive black-box nor a calling convention.
    pub fn compiled_modules(&self) -> Vec<ModIdx> {
        self.modules
            .iter()
            .filter(|m| !m.is_primitive() && !m.is_action())
            .map(|m| m.idx())
            .collect()
    }

    /// Register `cc` as the calling convention for action `name` on
    /// `owner`. A calling convention has no actions of its own.
    pub fn register_action(
        &mut self,
        owner: ModIdx,
        name: Id,
        cc: ModIdx,
    ) -> CacResult<()> {
        if self.module(cc).num_actions() != 0 {
            return Err(Error::malformed_structure(format!(
                "calling convention `{}' declares nested actions",
                self.module(cc).name()
            )));
        }
        self.module_mut(owner).add_action(name, cc)?;
        self.module_mut(cc).is_action = true;
        Ok(())
    }

    /// Reference to the port named `name` on instance `inst` of module
    /// `module`. The port's direction is flipped relative to its declaration
    /// on the source module: an input-declared port is driven by code inside
    /// the enclosing module.
    pub fn inst_pt<S>(
        &self,
        module: ModIdx,
        inst: InstIdx,
        name: S,
    ) -> CacResult<Port>
    where
        S: Into<Id>,
    {
        let name = name.into();
        let source = self.module(self.module(module).instance(inst).source);
        let def = source.ports.get(&name).ok_or_else(|| {
            Error::undefined(
                name,
                format!(
                    "port on instance `{}' of module `{}'",
                    self.module(module).instance(inst).name(),
                    source.name()
                ),
            )
        })?;
        Ok(Port {
            parent: PortParent::Inst(inst),
            name,
            width: def.width,
            direction: def.direction.reverse(),
            sensitive: source.defaults.contains_key(&name),
        })
    }

    /// Name of the module a port is resolved against: the enclosing module
    /// for self-ports, the instance's source module otherwise.
    pub fn declaring_module(&self, module: ModIdx, port: &Port) -> &Module {
        match port.parent {
            PortParent::This => self.module(module),
            PortParent::Inst(i) => {
                self.module(self.module(module).instance(i).source)
            }
        }
    }
}
