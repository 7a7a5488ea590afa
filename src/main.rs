//! Bandmath CLI - raster band math from the command line.

use anyhow::{bail, Context, Result};
use bandmath::prelude::*;
use std::path::{Path, PathBuf};

/// Parsed command line.
#[derive(Debug, Default)]
struct Args {
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    expressions: Vec<String>,
    in_context: Option<PathBuf>,
    out_context: Option<PathBuf>,
    config: Option<PathBuf>,
    threads: Option<usize>,
    pixel_type: Option<PixelType>,
    report: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("bandmath=info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || matches!(args[1].as_str(), "help" | "--help" | "-h") {
        print_usage(&args[0]);
        return;
    }

    let parsed = match parse_args(&args[1..]) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            print_usage(&args[0]);
            std::process::exit(2);
        }
    };

    if let Err(e) = run(parsed) {
        eprintln!("❌ {:#}", e);
        if let Some(fix) = e.downcast_ref::<BandMathError>().and_then(BandMathError::suggested_fix) {
            eprintln!("   hint: {}", fix);
        }
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("Bandmath v{}", bandmath::VERSION);
    println!();
    println!("Usage: {} -il <image>... -out <path> [options]", program);
    println!();
    println!("Options:");
    println!("  -il <image>...        Input images, named im1, im2, ... in order");
    println!("  -out <path>           Output image; extra outputs get a _k suffix");
    println!("  -exp <expression>     Expression (repeatable; one output each)");
    println!("  -incontext <file>     Import constants, matrices and expressions");
    println!("  -outcontext <file>    Export the session context");
    println!("  -config <file>        TOML run defaults");
    println!("  -threads <n>          Worker threads (0 = one per core)");
    println!("  -type <pixel type>    u8, i8, u16, i16, u32, i32, f32 or f64");
    println!("  -report               Print the run report as JSON");
    println!();
    println!("Example:");
    println!("  {} -il a.png b.png -out diff.png -exp \"abs(im1b1 - im2b1)\"", program);
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args::default();
    let mut i = 0;

    let value = |i: usize, flag: &str| -> Result<&String> {
        args.get(i + 1).with_context(|| format!("{} expects a value", flag))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-il" => {
                i += 1;
                while i < args.len() && !args[i].starts_with('-') {
                    parsed.inputs.push(PathBuf::from(&args[i]));
                    i += 1;
                }
                continue;
            }
            "-out" => parsed.output = Some(PathBuf::from(value(i, "-out")?)),
            "-exp" => parsed.expressions.push(value(i, "-exp")?.clone()),
            "-incontext" => parsed.in_context = Some(PathBuf::from(value(i, "-incontext")?)),
            "-outcontext" => parsed.out_context = Some(PathBuf::from(value(i, "-outcontext")?)),
            "-config" => parsed.config = Some(PathBuf::from(value(i, "-config")?)),
            "-threads" => {
                let text = value(i, "-threads")?;
                parsed.threads = Some(text.parse().with_context(|| format!("invalid thread count '{}'", text))?);
            }
            "-type" => {
                let text = value(i, "-type")?;
                parsed.pixel_type = Some(text.parse().map_err(anyhow::Error::msg)?);
            }
            "-report" => {
                parsed.report = true;
                i += 1;
                continue;
            }
            other => bail!("unknown option '{}'", other),
        }
        i += 2;
    }

    if parsed.inputs.is_empty() {
        bail!("at least one input image is required (-il)");
    }
    if parsed.output.is_none() {
        bail!("an output path is required (-out)");
    }
    Ok(parsed)
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => BandMathConfig::load_from_file(path)?,
        None => BandMathConfig {
            pixel_type: PixelType::U8,
            ..BandMathConfig::default()
        },
    };
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(pixel_type) = args.pixel_type {
        config.pixel_type = pixel_type;
    }

    let images = args
        .inputs
        .iter()
        .map(|path| {
            let decoded = image::open(path).with_context(|| format!("cannot read {}", path.display()))?;
            log::info!("Loaded {} ({}x{})", path.display(), decoded.width(), decoded.height());
            Ok(VectorImage::from_dynamic_image(&decoded))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut filter = config.filter()?;
    for image in &images {
        filter.declare_input(image, None)?;
    }
    if let Some(path) = &args.in_context {
        filter.import_context(path)?;
    }
    for expression in &args.expressions {
        filter.set_expression(expression);
    }
    if filter.expressions().is_empty() {
        bail!("no expression given (-exp or -incontext)");
    }

    let result = filter.run_largest()?;

    let output = args.output.as_deref().context("missing output path")?;
    for (k, image) in result.outputs.iter().enumerate() {
        let path = output_path(output, k);
        let encoded = image
            .to_dynamic_image(config.pixel_type)
            .with_context(|| format!("cannot encode output {}", k))?;
        encoded
            .save(&path)
            .with_context(|| format!("cannot write {}", path.display()))?;
        println!("✅ {} -> {}", filter.expressions()[k], path.display());
    }

    if let Some(path) = &args.out_context {
        filter.export_context(path)?;
    }

    if args.report {
        println!("{}", serde_json::to_string_pretty(&result.report)?);
    }
    Ok(())
}

/// Path of the `k`-th output: the given path for the first, `<stem>_k.<ext>`
/// for the others.
fn output_path(base: &Path, k: usize) -> PathBuf {
    if k == 0 {
        return base.to_path_buf();
    }
    let stem = base.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, k, ext.to_string_lossy()),
        None => format!("{}_{}", stem, k),
    };
    base.with_file_name(name)
}
