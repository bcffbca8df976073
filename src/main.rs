mod cmdline;

use cac_backend::{Backend, VerilogBackend};
use cac_frontend::CacParser;
use cac_ir as ir;
use cac_opt::passes::{
    DeadCodeElimination, InlineInvokes, NormalizeDelays, ReduceStructures,
    SynthesizeChannels,
};
use cac_opt::{Named, PassManager, register_alias};
use cac_utils::{CacResult, Error, OutputFile};
use cmdline::Opts;

fn register_passes(pm: &mut PassManager) -> CacResult<()> {
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
    Ok(())
}

fn run(opts: &Opts) -> CacResult<()> {
    let mut pm = PassManager::default();
    register_passes(&mut pm)?;

    if opts.list_passes {
        println!("{}", pm.complete_help());
        return Ok(());
    }

    let namespace = match &opts.file {
        Some(file) => CacParser::parse_file(file)?,
        None => CacParser::parse(std::io::stdin())?,
    };

    let mut ctx = ir::Context::new();
    let compiled = ir::lower_program(&mut ctx, &namespace)?;
    if compiled.is_empty() {
        return Err(Error::misc("program contains no compilable modules"));
    }

    let plan = if opts.pass.is_empty() {
        vec!["lower".to_string()]
    } else {
        opts.pass.clone()
    };
    for module in compiled {
        pm.execute_plan(
            &mut ctx,
            module,
            &plan,
            &opts.disable_pass,
            opts.dump_ir,
        )?;
        let name = ctx.module(module).name();
        let path = opts.out_dir.join(format!("{}.v", name));
        VerilogBackend.run(&ctx, module, OutputFile::File(path))?;
    }
    Ok(())
}

fn main() {
    let opts: Opts = argh::from_env();

    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    if let Err(err) = run(&opts) {
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }
}
