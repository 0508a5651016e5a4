// UKF fusion - Main Entry Point
// Filters a lidar/radar measurement file and writes the estimates

use clap::Parser;
use tracing::info;
use ukf_fusion::config::Config;
use ukf_fusion::measurement::Dataset;
use ukf_fusion::output::{JsonOutput, OutputHandler, TsvOutput};
use ukf_fusion::pipeline;
use ukf_fusion::tuning;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    let mut filter_config = config.filter_config()?;
    let dataset = Dataset::load(&config.input)?;
    info!(input = %config.input, records = dataset.len(), "dataset loaded");

    if config.tune {
        let datasets = if config.tune_input.is_empty() {
            vec![dataset.clone()]
        } else {
            config
                .tune_input
                .iter()
                .map(|path| Dataset::load(path))
                .collect::<Result<Vec<_>, _>>()?
        };
        let result = tuning::tune(
            &datasets,
            filter_config,
            config.score_weights(),
            config.tuning_params(),
        )?;
        info!(
            std_a = result.process_noise.std_a,
            std_yawdd = result.process_noise.std_yawdd,
            score = result.score,
            "using tuned process noise"
        );
        filter_config = filter_config.with_process_noise(result.process_noise);
    }

    let mut outputs: Vec<Box<dyn OutputHandler>> = vec![Box::new(TsvOutput::create(&config.output)?)];
    if let Some(path) = &config.json_output {
        outputs.push(Box::new(JsonOutput::create(path)?));
    }

    let summary = pipeline::run(&dataset, filter_config, &mut outputs)?;
    info!(output = %config.output, "estimates written");
    summary.log();

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_span_events(if verbose {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    if verbose {
        subscriber
            .with_max_level(tracing::Level::DEBUG)
            .init();
        info!("Verbose logging enabled (DEBUG level)");
    } else {
        subscriber
            .with_max_level(tracing::Level::INFO)
            .init();
    }
}
