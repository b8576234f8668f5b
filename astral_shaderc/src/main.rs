use std::path::Path;

use anyhow::Context;
use astral_shaderc::ShaderCompiler;
use clap::{Parser, Subcommand};
use log::error;
use rayon::prelude::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Print debug output for each compiled stage.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a shader file to a .shaderobj JSON file.
    Compile {
        /// The input .shader file.
        input: String,
        /// The output .shaderobj file.
        output: String,
        /// Compile stages without bounds checks.
        #[arg(long)]
        optimize: bool,
        /// Skip cross compiling stages to MSL.
        #[arg(long)]
        no_msl: bool,
    },
    /// Compile all .shader files in a folder to .shaderobj files.
    CompileFolder {
        /// The folder containing .shader files.
        input_folder: String,
        /// The output folder for the .shaderobj files.
        output_folder: String,
        /// Compile stages without bounds checks.
        #[arg(long)]
        optimize: bool,
        /// Skip cross compiling stages to MSL.
        #[arg(long)]
        no_msl: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .with_module_level("astral_shaderc", level)
        .init()
        .unwrap();

    let start = std::time::Instant::now();
    match cli.command {
        Commands::Compile {
            input,
            output,
            optimize,
            no_msl,
        } => {
            let compiler = ShaderCompiler::new().optimize(optimize).emit_msl(!no_msl);
            if let Err(e) = compile_file(&compiler, Path::new(&input), Path::new(&output)) {
                error!("{e:?}");
                std::process::exit(1);
            }
        }
        Commands::CompileFolder {
            input_folder,
            output_folder,
            optimize,
            no_msl,
        } => {
            let compiler = ShaderCompiler::new().optimize(optimize).emit_msl(!no_msl);
            let count = compile_folder(&compiler, &input_folder, Path::new(&output_folder));
            println!("Compiled {count} shaders");
        }
    }
    println!("Finished in {:?}", start.elapsed());
}

fn compile_file(compiler: &ShaderCompiler, input: &Path, output: &Path) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {input:?}"))?;
    let shader = compiler
        .compile(&source)
        .with_context(|| format!("failed to compile {input:?}"))?;
    shader
        .save(output)
        .with_context(|| format!("failed to write {output:?}"))?;
    Ok(())
}

fn compile_folder(compiler: &ShaderCompiler, input_folder: &str, output_folder: &Path) -> usize {
    if let Err(e) = std::fs::create_dir_all(output_folder) {
        error!("Error creating {output_folder:?}: {e}");
        return 0;
    }

    globwalk::GlobWalkerBuilder::from_patterns(input_folder, &["*.shader"])
        .build()
        .unwrap()
        .par_bridge()
        .filter_map(|entry| {
            let path = entry.as_ref().unwrap().path();
            let output = output_folder.join(path.with_extension("shaderobj").file_name()?);
            match compile_file(compiler, path, &output) {
                Ok(()) => Some(()),
                Err(e) => {
                    error!("{e:?}");
                    None
                }
            }
        })
        .count()
}
