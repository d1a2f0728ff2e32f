use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use signal_hook::consts::signal::{SIGINT, SIGTERM};

use power_quality_node::calibrate;
use power_quality_node::node;
use power_quality_node::power_quality::{
    generate_window, AcquisitionBuffer, MeasurementPipeline, MockGenerator, NodeConfig, SignalProfile, SignalType,
    SyntheticAdc, DEFAULT_TOPIC,
};
use power_quality_node::transport::{ConsoleTransport, Publisher, TcpTransport, Transport};
use power_quality_node::NodeResult;

/// Power quality measurement node
#[derive(Parser, Debug)]
#[command(author, version, about = "Power quality measurement node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sample, analyze and publish measurements
    Run(RunArgs),
    /// Publish generated measurements with injected anomalies
    Mock(MockArgs),
    /// Compute a scale coefficient from a reference signal
    Calibrate(CalibrateArgs),
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Broker bridge address (host:port); records go to the log when absent
    #[arg(short = 'b', long)]
    broker: Option<String>,

    #[arg(short = 't', long, default_value = DEFAULT_TOPIC)]
    topic: String,

    #[arg(long, default_value_t = 3000)]
    publish_interval_ms: u64,

    /// Acquisition rate in Hz
    #[arg(long, default_value_t = 1_000_000.0 / 333.0)]
    sample_rate: f64,

    /// Leave the waveform snippet out of published records
    #[arg(long)]
    no_waveform: bool,

    /// Keep every k-th waveform sample
    #[arg(long, default_value_t = 1)]
    waveform_decimation: usize,

    /// Stop after this many publishes
    #[arg(long)]
    cycles: Option<u64>,

    #[arg(long)]
    seed: Option<u64>,
}

impl CommonArgs {
    fn config(&self) -> NodeResult<NodeConfig> {
        let config = NodeConfig {
            sample_rate_hz: self.sample_rate,
            publish_interval: Duration::from_millis(self.publish_interval_ms),
            include_waveform: !self.no_waveform,
            waveform_decimation: self.waveform_decimation,
            topic: self.topic.clone(),
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    fn transport(&self) -> Arc<dyn Transport> {
        match &self.broker {
            Some(addr) => Arc::new(TcpTransport::new(addr.clone())),
            None => Arc::new(ConsoleTransport),
        }
    }
}

/// Synthetic front end driven in place of the hardware ADC
#[derive(Args, Debug, Clone)]
struct SourceArgs {
    #[arg(long, default_value_t = 230.0)]
    voltage: f64,

    #[arg(long, default_value_t = 5.0)]
    current: f64,

    #[arg(long, default_value_t = 50.0)]
    frequency: f64,

    /// Current lag behind voltage in degrees
    #[arg(long, default_value_t = 25.0)]
    lag_deg: f64,

    /// Relative 3rd/5th/7th harmonic content of the current (fraction)
    #[arg(long, default_value_t = 0.0)]
    current_distortion: f64,

    /// Uniform ADC noise half-width in LSB
    #[arg(long, default_value_t = 2.0)]
    noise_lsb: f64,
}

impl SourceArgs {
    fn profile(&self) -> SignalProfile {
        let mut profile =
            SignalProfile::sinusoidal(self.voltage, self.current, self.frequency, self.lag_deg.to_radians());
        for (order, weight) in [(3, 1.0), (5, 0.6), (7, 0.3)] {
            profile.current_harmonics[order - 1] = self.current_distortion * weight;
        }
        profile.noise_lsb = self.noise_lsb;
        profile
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Args, Debug)]
struct MockArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Chance that a cycle carries an anomaly
    #[arg(long, default_value_t = 0.2)]
    anomaly_probability: f64,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    source: SourceArgs,

    /// Reference voltage RMS
    #[arg(long, default_value_t = 230.0)]
    target_voltage: f64,

    /// Reference current RMS
    #[arg(long, default_value_t = 5.0)]
    target_current: f64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run(args),
        Commands::Mock(args) => mock(args),
        Commands::Calibrate(args) => calibrate(args),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn register_shutdown() -> NodeResult<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))?;
    }
    Ok(shutdown)
}

fn run(args: RunArgs) -> NodeResult<()> {
    let config = args.common.config()?;
    let shutdown = register_shutdown()?;
    let transport = args.common.transport();
    let publisher = Publisher::new(Arc::clone(&transport), config.topic.clone());

    let period = config.tick_period();
    let mut adc = SyntheticAdc::new(args.source.profile(), config.clone(), args.common.seed.unwrap_or(0));
    let mut pipeline = MeasurementPipeline::new(config)?;

    let mut buffer = AcquisitionBuffer::new();
    let (mut sampler, mut drain) = buffer.split();

    log::info!(
        "Sampling every {} us, publishing to {}",
        period.as_micros(),
        publisher.topic()
    );

    thread::scope(|scope| {
        let shutdown = shutdown.as_ref();
        let transport = transport.as_ref();

        let sampler_thread = scope.spawn(move || node::run_sampler(&mut sampler, &mut adc, period, shutdown));
        scope.spawn(move || node::run_maintenance(transport, shutdown));

        node::run_worker(&mut drain, &mut pipeline, &publisher, shutdown, args.common.cycles);
        shutdown.store(true, Ordering::Relaxed);

        match sampler_thread.join() {
            Ok(stats) => log::info!(
                "Sampler stopped: {} ticks, {} windows, {} held",
                stats.ticks,
                stats.windows,
                stats.held
            ),
            Err(_) => log::error!("Sampler thread panicked"),
        }
    });

    Ok(())
}

fn mock(args: MockArgs) -> NodeResult<()> {
    let config = args.common.config()?;
    let shutdown = register_shutdown()?;
    let transport = args.common.transport();
    let publisher = Publisher::new(Arc::clone(&transport), config.topic.clone());
    let mut generator = MockGenerator::new(config, args.anomaly_probability, args.common.seed)?;

    thread::scope(|scope| {
        let shutdown = shutdown.as_ref();
        let transport = transport.as_ref();

        scope.spawn(move || node::run_maintenance(transport, shutdown));

        let stats = node::run_mock(&mut generator, &publisher, shutdown, args.common.cycles);
        shutdown.store(true, Ordering::Relaxed);
        log::info!("Mock stopped: {} sent, {} dropped", stats.sent, stats.dropped);
    });

    Ok(())
}

fn calibrate(args: CalibrateArgs) -> NodeResult<()> {
    let config = args.common.config()?;
    let mut rng = match args.common.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let window = generate_window(&args.source.profile(), &config, &mut rng);

    calibrate::calibrate_window(&window, SignalType::Voltage, args.target_voltage)?;
    calibrate::calibrate_window(&window, SignalType::Current, args.target_current)?;
    Ok(())
}
