//! Command line parsing for the compiler driver.

use argh::FromArgs;
use std::path::PathBuf;

/// Lower a CAC program into synthesizable Verilog, one file per compiled
/// module.
#[derive(FromArgs)]
pub struct Opts {
    /// input CAC program; read from stdin when omitted
    #[argh(positional)]
    pub file: Option<PathBuf>,

    /// directory the generated `<module>.v` files are placed in
    #[argh(option, short = 'o', default = "PathBuf::from(\".\")")]
    pub out_dir: PathBuf,

    /// passes or aliases to run, in order (default: `lower`)
    #[argh(option, short = 'p')]
    pub pass: Vec<String>,

    /// passes or aliases to exclude from the plan
    #[argh(option, short = 'x')]
    pub disable_pass: Vec<String>,

    /// print the IR after every pass
    #[argh(switch)]
    pub dump_ir: bool,

    /// list registered passes and aliases, then exit
    #[argh(switch)]
    pub list_passes: bool,
}
