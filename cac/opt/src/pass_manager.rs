//! Define the PassManager structure that is used to construct and run pass
//! pipelines.
use crate::traversal::{Named, Pass};
use cac_ir as ir;
use cac_utils::{CacResult, Error};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::time::Instant;

/// Top-level type for all passes that transform a module inside an
/// [`ir::Context`].
pub type PassClosure =
    Box<dyn Fn(&mut ir::Context, ir::ModIdx) -> CacResult<()>>;

/// Structure that tracks all registered passes for the compiler.
#[derive(Default)]
pub struct PassManager {
    /// All registered passes.
    passes: HashMap<String, PassClosure>,
    /// Tracks aliases for groups of passes that run together.
    aliases: HashMap<String, Vec<String>>,
    // Track the help information for passes.
    help: HashMap<String, String>,
}

impl PassManager {
    /// Register a new pass and return an error if another pass with the
    /// same name has already been registered.
    pub fn register_pass<P>(&mut self) -> CacResult<()>
    where
        P: Pass + Named + Default + 'static,
    {
        let name = P::name().to_string();
        if self.passes.contains_key(&name) {
            return Err(Error::misc(format!(
                "Pass with name '{}' is already registered.",
                name
            )));
        }
        let pass_closure: PassClosure =
            Box::new(|ir, module| P::do_pass(ir, module));
        self.passes.insert(name.clone(), pass_closure);
        let mut help = String::new();
        write!(&mut help, "- {}: {}", name, P::description()).unwrap();
        self.help.insert(name, help);
        Ok(())
    }

    /// Adds a new alias for groups of passes. An alias is a list of strings
    /// that represent valid pass names OR an alias.
    /// The passes and aliases are executed in the order of specification.
    pub fn add_alias(
        &mut self,
        name: String,
        passes: Vec<String>,
    ) -> CacResult<()> {
        if self.aliases.contains_key(&name) {
            return Err(Error::misc(format!(
                "Alias with name '{}' already registered.",
                name
            )));
        }
        // Expand any aliases used in defining this alias.
        let all_passes = passes
            .into_iter()
            .flat_map(|pass| {
                if self.aliases.contains_key(&pass) {
                    self.aliases[&pass].clone()
                } else if self.passes.contains_key(&pass) {
                    vec![pass]
                } else {
                    panic!("No pass or alias named: {}", pass)
                }
            })
            .collect();
        self.aliases.insert(name, all_passes);
        Ok(())
    }

    /// Return a string representation to show all available passes and
    /// aliases. Appropriate for help text.
    pub fn complete_help(&self) -> String {
        let mut ret = String::with_capacity(1000);

        let mut pass_names = self.passes.keys().collect::<Vec<_>>();
        pass_names.sort();
        ret.push_str("Passes:\n");
        pass_names.iter().for_each(|&pass| {
            writeln!(ret, "{}", self.help[pass]).unwrap();
        });

        let mut aliases = self.aliases.iter().collect::<Vec<_>>();
        aliases.sort_by(|kv1, kv2| kv1.0.cmp(kv2.0));
        ret.push_str("\nAliases:\n");
        aliases.iter().for_each(|(alias, passes)| {
            let pass_str = passes
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<String>>()
                .join(", ");
            writeln!(ret, "- {}: {}", alias, pass_str).unwrap();
        });
        ret
    }

    /// Attempts to resolve the alias name. If there is no alias with this
    /// name, assumes that this is a pass instead.
    fn resolve_alias(&self, maybe_alias: &str) -> Vec<String> {
        self.aliases
            .get(maybe_alias)
            .cloned()
            .unwrap_or_else(|| vec![maybe_alias.to_string()])
    }

    /// Creates a plan using an inclusion and exclusion list which might
    /// contain aliases.
    fn create_plan(
        &self,
        incls: &[String],
        excls: &[String],
    ) -> CacResult<(Vec<String>, HashSet<String>)> {
        // Incls and excls can both have aliases in them. Resolve them.
        let passes = incls
            .iter()
            .flat_map(|maybe_alias| self.resolve_alias(maybe_alias))
            .collect::<Vec<_>>();

        let excl_set = excls
            .iter()
            .flat_map(|maybe_alias| self.resolve_alias(maybe_alias))
            .collect::<HashSet<String>>();

        // Validate that names of passes in incl and excl sets are known.
        passes.iter().chain(excl_set.iter()).try_for_each(|pass| {
            if !self.passes.contains_key(pass) {
                Err(Error::misc(format!(
                    "Unknown pass: {pass}. Run the compiler with --list-passes to view registered passes."
                )))
            } else {
                Ok(())
            }
        })?;

        Ok((passes, excl_set))
    }

    /// Executes a given "plan" constructed using the incl and excl lists on
    /// one module.
    pub fn execute_plan(
        &self,
        ctx: &mut ir::Context,
        module: ir::ModIdx,
        incl: &[String],
        excl: &[String],
        dump_ir: bool,
    ) -> CacResult<()> {
        let (passes, excl_set) = self.create_plan(incl, excl)?;

        for name in passes {
            // Pass is known to exist because create_plan validates the
            // names of passes.
            let pass = &self.passes[&name];

            if !excl_set.contains(&name) {
                let start = Instant::now();
                pass(ctx, module)?;
                if dump_ir {
                    ir::Printer::write_module(
                        ctx,
                        module,
                        &mut std::io::stdout(),
                    )?;
                }
                log::info!("{name}: {}ms", start.elapsed().as_millis());
            } else {
                log::info!("{name}: Ignored");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::PassManager;
    use crate::passes::{
        DeadCodeElimination, InlineInvokes, NormalizeDelays,
        ReduceStructures, SynthesizeChannels,
    };
    use crate::register_alias;
    use crate::traversal::Named;
    use cac_frontend::CacParser;
    use cac_ir::{self as ir, PrimKind};
    use cac_utils::CacResult;

    fn manager() -> CacResult<PassManager> {
        let mut pm = PassManager::default();
        pm.register_pass::<InlineInvokes>()?;
        pm.register_pass::<NormalizeDelays>()?;
        pm.register_pass::<SynthesizeChannels>()?;
        pm.register_pass::<ReduceStructures>()?;
        pm.register_pass::<DeadCodeElimination>()?;
        register_alias!(
            pm,
            "lower",
            [
                InlineInvokes,
                NormalizeDelays,
                SynthesizeChannels,
                ReduceStructures,
                DeadCodeElimination,
            ]
        );
        Ok(pm)
    }

    /// A two-stage pipeline in the surface language: add one, latch, add
    /// one again.
    const PIPE: &str = r#"
    module pipe(input [15:0] in_data, input in_valid, output [15:0] result)
      add_16 a0;
      add_16 a1;
      register_16 r;
      wire_16 tmp;
      sequence @(posedge clk, synch rst) begin
        top: a0.apply(in_data, 1, tmp.in);
        r.st(tmp.out, in_valid);
        a1.apply(r.data, 1, result);
        goto (1, top, 1);
      end
    endmodule
    "#;

    #[test]
    fn lower_alias_fully_lowers_a_surface_program() {
        let pm = manager().unwrap();
        let ns = CacParser::parse(PIPE.as_bytes()).unwrap();
        let mut ctx = ir::Context::new();
        let compiled = ir::lower_program(&mut ctx, &ns).unwrap();
        assert_eq!(compiled.len(), 1);
        let m = compiled[0];

        pm.execute_plan(
            &mut ctx,
            m,
            &["lower".to_string()],
            &[],
            false,
        )
        .unwrap();

        let module = ctx.module(m);
        assert!(module.instrs().all(|(_, i)| !i.is_invoke()));
        assert!(module.instrs().all(|(_, i)| {
            i.continuations.iter().all(|act| act.delay <= 1)
        }));
        assert!(module.instances().all(|(_, inst)| {
            !matches!(
                ctx.module(inst.source).prototype,
                Some(ir::Prototype { kind: PrimKind::Channel, .. })
            )
        }));
        // The pipeline register survives lowering: its data feeds the
        // second adder.
        assert!(module.find_instance("r").is_some());
    }

    #[test]
    fn unknown_pass_is_reported() {
        let pm = manager().unwrap();
        let ns = CacParser::parse(PIPE.as_bytes()).unwrap();
        let mut ctx = ir::Context::new();
        let compiled = ir::lower_program(&mut ctx, &ns).unwrap();
        let err = pm.execute_plan(
            &mut ctx,
            compiled[0],
            &["no-such-pass".to_string()],
            &[],
            false,
        );
        assert!(err.is_err());
    }

    #[test]
    fn excluded_passes_are_skipped() {
        let pm = manager().unwrap();
        let ns = CacParser::parse(PIPE.as_bytes()).unwrap();
        let mut ctx = ir::Context::new();
        let compiled = ir::lower_program(&mut ctx, &ns).unwrap();
        let m = compiled[0];
        pm.execute_plan(
            &mut ctx,
            m,
            &["lower".to_string()],
            &[InlineInvokes::name().to_string()],
            false,
        )
        .unwrap_err();
        // Without inlining, delay normalization refuses to run.
    }
}

/// Register an alias for a pipeline of passes, named by their types.
/// Expands to a fallible [`PassManager::add_alias`] call.
///
/// ## Example
/// ```ignore
/// register_alias!(pm, "lower", [InlineInvokes, NormalizeDelays]);
/// ```
#[macro_export]
macro_rules! register_alias {
    ($manager:expr, $alias:literal, [ $($pass:ident),* $(,)? ]) => {
        $manager.add_alias(
            $alias.to_string(),
            vec![$($pass::name().to_string()),*],
        )?;
    };
}
