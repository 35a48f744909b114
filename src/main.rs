//! Command line front end: reads a y4m clip and prints the global motion of
//! every frame as JSON.

use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::PathBuf,
};

use anyhow::Context;
use av_globalmotion::{
    AnalysisOptions,
    Decoder,
    DownsamplingMethod,
    ErrorAdvantageType,
    GlobalMotionResults,
    REF_LIST_MAX_DEPTH,
    ResolutionTier,
    SearchPolicy,
    analyze_global_motion,
};
use clap::Parser;
use log::{LevelFilter, info};

#[derive(Parser, Debug)]
#[command(name = "av-globalmotion", version, about)]
struct Args {
    /// Sets the input file to use, `-` for stdin
    input: String,

    /// File to write results in, pretty-printed
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Previous frames each frame is estimated against
    #[arg(long, short, default_value_t = 1, value_parser = reference_count_parser())]
    references: u8,

    /// Pyramid tier the estimator runs at
    #[arg(long, value_enum, default_value_t = ResolutionTier::Full)]
    resolution: ResolutionTier,

    /// How the lower pyramid tiers are produced
    #[arg(long, value_enum, default_value_t = DownsamplingMethod::Filtered)]
    downsampling: DownsamplingMethod,

    /// Reference loop strategy
    #[arg(long, value_enum, default_value_t = SearchPolicy::FastEarlyExit)]
    policy: SearchPolicy,

    /// How strictly a model has to beat the unwarped reference
    #[arg(long, value_enum, default_value_t = ErrorAdvantageType::Strict)]
    error_advantage: ErrorAdvantageType,

    /// Keep translations at 1/4 pel instead of 1/8 pel
    #[arg(long)]
    low_precision_mv: bool,

    /// Stop after the nearest reference when it has no motion
    #[arg(long)]
    identity_exit: bool,

    /// Analyze at most this many frames
    #[arg(long)]
    limit: Option<usize>,

    /// Increase log verbosity, may be repeated
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.verbose)?;

    #[cfg(feature = "tracing")]
    let _guard = {
        use tracing_subscriber::prelude::*;

        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new().build();
        tracing_subscriber::registry().with(chrome_layer).init();
        guard
    };

    let input = match args.input.as_str() {
        "-" => Box::new(io::stdin()) as Box<dyn Read>,
        f => Box::new(File::open(f).with_context(|| format!("could not open {f}"))?)
            as Box<dyn Read>,
    };
    let mut dec = Decoder::new(BufReader::new(input))?;
    let details = dec.get_video_details();
    info!(
        "{}x{} {}-bit at {} fps",
        details.width, details.height, details.bit_depth, details.frame_rate
    );

    let opts = AnalysisOptions {
        reference_count: usize::from(args.references),
        resolution: args.resolution,
        downsampling: args.downsampling,
        allow_high_precision_mv: !args.low_precision_mv,
        policy: args.policy,
        error_advantage: args.error_advantage,
        identity_exit: args.identity_exit,
    };

    let progress = |frames: usize| log::debug!("analyzed {} frames", frames);
    let results = if details.bit_depth == 8 {
        analyze_global_motion::<_, u8>(&mut dec, opts, args.limit, Some(&progress))?
    } else {
        analyze_global_motion::<_, u16>(&mut dec, opts, args.limit, Some(&progress))?
    };
    info!(
        "{} frames at {:.2} fps, {} with global motion",
        results.frame_count,
        results.speed,
        moving_frames(&results)
    );

    print!("{}", serde_json::to_string(&results)?);

    if let Some(path) = args.output {
        let mut file = File::create(&path)
            .with_context(|| format!("could not create {}", path.display()))?;
        let output = serde_json::to_string_pretty(&results)?;
        file.write_all(output.as_bytes())?;
    }

    Ok(())
}

fn reference_count_parser() -> clap::builder::RangedI64ValueParser<u8> {
    clap::value_parser!(u8).range(1..=REF_LIST_MAX_DEPTH as i64)
}

fn moving_frames(results: &GlobalMotionResults) -> usize {
    results
        .frames
        .iter()
        .filter(|frame| frame.is_global_motion.iter().any(|&moving| moving))
        .count()
}

fn init_logger(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            #[cfg(feature = "devel")]
            let level = {
                let level = record.level();
                let style = match level {
                    log::Level::Error => console::Style::new().red().bold(),
                    log::Level::Warn => console::Style::new().yellow(),
                    log::Level::Info => console::Style::new().green(),
                    log::Level::Debug => console::Style::new().cyan(),
                    log::Level::Trace => console::Style::new().dim(),
                };
                style.apply_to(level)
            };
            #[cfg(not(feature = "devel"))]
            let level = record.level();

            out.finish(format_args!("[{}] {}: {}", level, record.target(), message));
        })
        .level(level)
        .chain(io::stderr())
        .apply()?;
    Ok(())
}
