//! adc-pingpong frontend.
//!
//! Drives [`AcquisitionController`] with a converter model and a draining
//! host. Two execution modes:
//!
//! - **run**: headless. Runs until a scan count or cycle limit, then prints
//!   a summary, optional scan dump, profile report and watchpoint hits.
//! - **view**: minifb window plotting the 24 channels of the most recently
//!   drained half as strip charts, with flag and fault indicators.
//!   Keys: Esc=quit Space=pause A=acknowledge fault (also clears injected
//!   converter faults).

mod host;
mod stimulus;

use adc_pingpong_core::monitor::{self, WatchKind, Watchpoint};
use adc_pingpong_core::savestate;
use adc_pingpong_core::{
    AcquisitionConfig, AcquisitionController, TickOutput, CHANNEL_COUNT, DEVICE_COUNT,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use minifb::{Key, Scale, ScaleMode, Window, WindowOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use host::DrainingHost;
use stimulus::ConverterModel;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file (fields not given keep their defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run headless and print a summary
    Run(RunArgs),
    /// Live strip-chart window
    View(ViewArgs),
}

/// Options shared by both modes.
#[derive(Args, Debug)]
struct BenchArgs {
    /// Buffer capacity in scans (even, at least 2)
    #[arg(long)]
    buffer_scans: Option<usize>,

    /// WRITE_DELAY length in cycles
    #[arg(long)]
    settle_cycles: Option<u32>,

    /// Cycles each converter holds busy after a start pulse
    #[arg(long, default_value_t = 4)]
    busy_cycles: u32,

    /// Device that never leaves busy
    #[arg(long)]
    stuck_device: Option<usize>,

    /// Stagger data-valid strobes so they never coincide
    #[arg(long)]
    skew_valid: bool,

    /// Host never reads
    #[arg(long)]
    no_drain: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    bench: BenchArgs,

    /// Stop after this many completed scans
    #[arg(long)]
    scans: Option<u64>,

    /// Hard cycle limit
    #[arg(long, default_value_t = 1_000_000)]
    max_cycles: u64,

    /// Print the first N scans of the buffer at exit
    #[arg(long)]
    dump: Option<usize>,

    /// Print per-state cycle profile at exit
    #[arg(long)]
    profile: bool,

    /// Buffer word watchpoint, ADDR or ADDR=VALUE (decimal or 0x hex), repeatable
    #[arg(long, value_parser = parse_watch)]
    watch: Vec<Watchpoint>,

    /// Print buffer words that differ from this saved state at exit
    #[arg(long)]
    diff_state: Option<PathBuf>,

    /// Maximum lines printed by --diff-state
    #[arg(long, default_value_t = 64)]
    diff_limit: usize,

    /// Write controller state here at exit
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Restore controller state before running
    #[arg(long)]
    load_state: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ViewArgs {
    #[command(flatten)]
    bench: BenchArgs,

    /// Controller cycles simulated per displayed frame
    #[arg(long, default_value_t = 20_000)]
    cycles_per_frame: u64,
}

fn parse_number(s: &str) -> std::result::Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_watch(s: &str) -> std::result::Result<Watchpoint, String> {
    let (addr, value) = match s.split_once('=') {
        Some((addr, value)) => (addr, Some(value)),
        None => (s, None),
    };
    let addr = usize::try_from(parse_number(addr.trim())?)
        .map_err(|_| format!("address '{}' too large", addr))?;
    let wp = Watchpoint::new(addr, WatchKind::Any);
    match value {
        None => Ok(wp),
        Some(v) => {
            let v = u16::try_from(parse_number(v.trim())?)
                .map_err(|_| format!("value '{}' does not fit 16 bits", v))?;
            Ok(wp.with_value(v))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let base = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Run(args) => run_headless(base, args),
        Command::View(args) => run_view(base, args),
    }
}

fn load_config(path: Option<&Path>) -> Result<AcquisitionConfig> {
    let Some(path) = path else { return Ok(AcquisitionConfig::default()) };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: AcquisitionConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    info!(path = %path.display(), ?config, "config loaded");
    Ok(config)
}

// ─── Bench ──────────────────────────────────────────────────────────────────

/// Controller plus the two models on either side of it.
struct Bench {
    ctl: AcquisitionController,
    model: ConverterModel,
    host: DrainingHost,
}

impl Bench {
    fn new(mut config: AcquisitionConfig, args: &BenchArgs) -> Result<Self> {
        if let Some(scans) = args.buffer_scans { config.buffer_scans = scans; }
        if let Some(settle) = args.settle_cycles { config.settle_cycles = settle; }
        if let Some(dev) = args.stuck_device {
            if dev >= DEVICE_COUNT {
                bail!("--stuck-device {} out of range (0..{})", dev, DEVICE_COUNT);
            }
        }
        let ctl = AcquisitionController::new(config).context("invalid acquisition config")?;
        let model = ConverterModel::new(args.busy_cycles)
            .with_stuck_device(args.stuck_device)
            .with_skewed_valid(args.skew_valid);
        Ok(Bench { ctl, model, host: DrainingHost::new(!args.no_drain) })
    }

    fn step(&mut self) -> TickOutput {
        let inputs = self.model.inputs();
        let out = self.ctl.tick(&inputs, self.host.bus());
        self.model.observe(&out.converter);
        self.host.observe(&out, &self.ctl);
        out
    }
}

// ─── Headless Mode ──────────────────────────────────────────────────────────

fn run_headless(config: AcquisitionConfig, args: RunArgs) -> Result<()> {
    let mut bench = Bench::new(config, &args.bench)?;
    if let Some(path) = &args.load_state {
        bench.ctl.load_from_file(path)
            .with_context(|| format!("loading state {}", path.display()))?;
        info!(path = %path.display(), cycles = bench.ctl.cycles(), "state restored");
    }
    for wp in &args.watch {
        if wp.addr >= bench.ctl.buffer.len() {
            bail!("watch address 0x{:X} outside buffer of {} words", wp.addr, bench.ctl.buffer.len());
        }
        bench.ctl.monitor.watch(wp.clone());
    }
    if args.profile { bench.ctl.profiler.start(); }

    let start_scans = bench.ctl.sequencer.scans_completed;
    let start = Instant::now();
    let mut cycles = 0u64;
    let mut fault = None;
    while cycles < args.max_cycles {
        let out = bench.step();
        cycles += 1;
        for hit in bench.ctl.monitor.drain_hits() {
            println!("  watch [{}] {} @ cycle {}", hit.index, hit.access, hit.cycle);
        }
        if out.alarm {
            fault = bench.ctl.fault();
            break;
        }
        if let Some(limit) = args.scans {
            if bench.ctl.sequencer.scans_completed - start_scans >= limit { break; }
        }
    }
    let elapsed = start.elapsed().as_secs_f64();

    print_summary(&bench, cycles, elapsed);
    if let Some(kind) = fault {
        warn!(%kind, "run stopped on fault");
        println!("Fault: {}", kind);
    }
    if let Some(n) = args.dump {
        println!("\n--- First {} scans ---", n);
        print!("{}", monitor::dump_scans(bench.ctl.buffer.words(), 0, n));
    }
    if !args.watch.is_empty() {
        println!("\n--- Watchpoints ---");
        print!("{}", bench.ctl.monitor.list_watchpoints());
    }
    if args.profile {
        println!();
        print!("{}", bench.ctl.profiler.report());
    }
    if let Some(path) = &args.diff_state {
        println!("\n--- Buffer changes since {} ---", path.display());
        print!("{}", diff_against_state(&bench.ctl, path, args.diff_limit)?);
    }
    if let Some(path) = &args.save_state {
        bench.ctl.save_to_file(path)
            .with_context(|| format!("saving state {}", path.display()))?;
        info!(path = %path.display(), "state saved");
    }
    Ok(())
}

/// Diff a saved state's buffer against the live buffer.
fn diff_against_state(ctl: &AcquisitionController, path: &Path, limit: usize) -> Result<String> {
    let saved = savestate::load_from_file(path, Some(ctl.config().buffer_scans))
        .with_context(|| format!("loading state {}", path.display()))?;
    Ok(monitor::dump_diff(&saved.buffer, ctl.buffer.words(), limit))
}

fn print_summary(bench: &Bench, cycles: u64, elapsed: f64) {
    let ctl = &bench.ctl;
    let rate = if elapsed > 0.0 { cycles as f64 / elapsed / 1e6 } else { 0.0 };
    println!("Ran {} cycles in {:.3}s ({:.2} Mcycles/s)", cycles, elapsed, rate);
    println!("State: {}  scans: {}  conversions: {}",
        ctl.state().name(), ctl.sequencer.scans_completed, bench.model.conversions());
    println!("WP: {}  RP: {}  half: {:?}  upper_ready: {}  lower_ready: {}",
        ctl.write_pointer(), ctl.read_pointer(), ctl.current_half(),
        ctl.upper_half_ready() as u8, ctl.lower_half_ready() as u8);
    println!("Overruns: {}  faults: {}", ctl.overruns(), ctl.sequencer.faults);
    println!("Host: {} halves drained, {} words read, {} stale",
        bench.host.halves_drained, bench.host.words_read, bench.host.stale_drains);
    if let Some(last) = &bench.host.last {
        println!("Last drain: {:?} half, generation {}, {} words",
            last.half, last.generation, last.words.len());
    }
}

// ─── Strip-Chart Viewer ─────────────────────────────────────────────────────

const VIEW_WIDTH: usize = 960;
const STATUS_HEIGHT: usize = 16;
const STRIP_HEIGHT: usize = 28;
const VIEW_HEIGHT: usize = STATUS_HEIGHT + STRIP_HEIGHT * CHANNEL_COUNT;

const COLOR_BG: u32 = 0x0010_1418;
const COLOR_GRID: u32 = 0x0028_2C34;
const COLOR_OFF: u32 = 0x0040_4040;
const COLOR_READY: u32 = 0x0030_C050;
const COLOR_FAULT: u32 = 0x00E0_3030;
const COLOR_OVERRUN: u32 = 0x00E0_B020;
const COLOR_BUSY: u32 = 0x0030_80E0;
const TRACE_COLORS: [u32; 3] = [0x0060_D0FF, 0x00FF_A060, 0x00A0_FF80];

fn run_view(config: AcquisitionConfig, args: ViewArgs) -> Result<()> {
    let mut bench = Bench::new(config, &args.bench)?;

    let mut window = Window::new(
        "adc-pingpong", VIEW_WIDTH, VIEW_HEIGHT,
        WindowOptions {
            scale: Scale::X1,
            scale_mode: ScaleMode::AspectRatioStretch,
            resize: true,
            ..Default::default()
        },
    ).map_err(|e| anyhow!("creating window: {}", e))?;
    window.set_target_fps(60);

    let mut fb = vec![COLOR_BG; VIEW_WIDTH * VIEW_HEIGHT];
    let mut paused = false;
    let mut prev_space = false;
    let mut prev_a = false;
    let mut last_title = Instant::now();
    let mut frames = 0u64;

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let space = window.is_key_down(Key::Space);
        if space && !prev_space { paused = !paused; }
        prev_space = space;

        let a = window.is_key_down(Key::A);
        if a && !prev_a {
            if let Some(kind) = bench.ctl.acknowledge_fault() {
                info!(%kind, "fault acknowledged from viewer");
                bench.model.repair();
            }
        }
        prev_a = a;

        if !paused {
            for _ in 0..args.cycles_per_frame {
                bench.step();
            }
        }

        render(&bench, &mut fb);
        window.update_with_buffer(&fb, VIEW_WIDTH, VIEW_HEIGHT)
            .map_err(|e| anyhow!("window update: {}", e))?;

        frames += 1;
        if last_title.elapsed().as_secs_f64() >= 1.0 {
            let fps = frames as f64 / last_title.elapsed().as_secs_f64();
            let fault = bench.ctl.fault().map(|k| format!(" [FAULT: {}]", k)).unwrap_or_default();
            let pause = if paused { " [PAUSED]" } else { "" };
            window.set_title(&format!("adc-pingpong - {:.0} FPS  scans {}  overruns {}{}{}",
                fps, bench.ctl.sequencer.scans_completed, bench.ctl.overruns(), fault, pause));
            frames = 0;
            last_title = Instant::now();
        }
    }
    Ok(())
}

fn fill_rect(fb: &mut [u32], x: usize, y: usize, w: usize, h: usize, color: u32) {
    for row in y..(y + h).min(VIEW_HEIGHT) {
        let start = row * VIEW_WIDTH + x.min(VIEW_WIDTH);
        let end = row * VIEW_WIDTH + (x + w).min(VIEW_WIDTH);
        fb[start..end].fill(color);
    }
}

fn render(bench: &Bench, fb: &mut [u32]) {
    fb.fill(COLOR_BG);
    let ctl = &bench.ctl;

    // status bar: upper flag, lower flag, fault, overrun, then one block per device busy
    let indicators = [
        if ctl.upper_half_ready() { COLOR_READY } else { COLOR_OFF },
        if ctl.lower_half_ready() { COLOR_READY } else { COLOR_OFF },
        if ctl.fault().is_some() { COLOR_FAULT } else { COLOR_OFF },
        if ctl.pointers.overrun { COLOR_OVERRUN } else { COLOR_OFF },
    ];
    for (i, &color) in indicators.iter().enumerate() {
        fill_rect(fb, 4 + i * 20, 3, 14, 10, color);
    }
    let busy = bench.model.busy_devices();
    for dev in 0..DEVICE_COUNT {
        let color = if bench.model.in_reset() { COLOR_FAULT }
            else if busy.get(dev) { COLOR_BUSY } else { COLOR_OFF };
        fill_rect(fb, 100 + dev * 20, 3, 14, 10, color);
    }

    // strips
    for ch in 0..CHANNEL_COUNT {
        let top = STATUS_HEIGHT + ch * STRIP_HEIGHT;
        fill_rect(fb, 0, top + STRIP_HEIGHT - 1, VIEW_WIDTH, 1, COLOR_GRID);
    }
    let Some(last) = &bench.host.last else { return };
    let scans = last.words.len() / CHANNEL_COUNT;
    if scans == 0 { return; }
    for ch in 0..CHANNEL_COUNT {
        let top = STATUS_HEIGHT + ch * STRIP_HEIGHT;
        let color = TRACE_COLORS[ch / (CHANNEL_COUNT / DEVICE_COUNT)];
        for x in 0..VIEW_WIDTH {
            let scan = x * scans / VIEW_WIDTH;
            let word = last.words[scan * CHANNEL_COUNT + ch] as usize;
            let y = top + (STRIP_HEIGHT - 2) - word * (STRIP_HEIGHT - 2) / 0xFFFF;
            fb[y * VIEW_WIDTH + x] = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench_args() -> BenchArgs {
        BenchArgs {
            buffer_scans: None,
            settle_cycles: None,
            busy_cycles: 4,
            stuck_device: None,
            skew_valid: false,
            no_drain: false,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("adc-pingpong-{}-{}", std::process::id(), name))
    }

    fn temp_config(name: &str, body: &str) -> AcquisitionConfig {
        let path = temp_path(name);
        std::fs::write(&path, body).unwrap();
        let cfg = load_config(Some(&path));
        let _ = std::fs::remove_file(&path);
        cfg.unwrap()
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg = temp_config("partial.json", r#"{"settle_cycles": 3, "conversion_timeout": null}"#);
        let defaults = AcquisitionConfig::default();
        assert_eq!(cfg.settle_cycles, 3);
        assert_eq!(cfg.conversion_timeout, None);
        assert_eq!(cfg.buffer_scans, defaults.buffer_scans);
        assert_eq!(cfg.data_valid_timeout, defaults.data_valid_timeout);
        assert_eq!(load_config(None).unwrap(), defaults);
    }

    #[test]
    fn test_cli_flags_override_file() {
        let cfg = temp_config("override.json", r#"{"buffer_scans": 8, "settle_cycles": 3}"#);

        let bench = Bench::new(cfg.clone(), &bench_args()).unwrap();
        assert_eq!(bench.ctl.config().buffer_scans, 8);
        assert_eq!(bench.ctl.config().settle_cycles, 3);

        let args = BenchArgs { buffer_scans: Some(16), settle_cycles: Some(5), ..bench_args() };
        let bench = Bench::new(cfg, &args).unwrap();
        assert_eq!(bench.ctl.config().buffer_scans, 16);
        assert_eq!(bench.ctl.config().settle_cycles, 5);
        assert_eq!(bench.ctl.buffer.len(), 16 * CHANNEL_COUNT);
    }

    #[test]
    fn test_rejects_bad_config_and_flags() {
        let path = temp_path("broken.json");
        std::fs::write(&path, "{\"buffer_scans\": \"many\"}").unwrap();
        assert!(load_config(Some(&path)).is_err());
        let _ = std::fs::remove_file(&path);

        let odd = BenchArgs { buffer_scans: Some(3), ..bench_args() };
        assert!(Bench::new(AcquisitionConfig::default(), &odd).is_err());
        let stuck = BenchArgs { stuck_device: Some(DEVICE_COUNT), ..bench_args() };
        assert!(Bench::new(AcquisitionConfig::default(), &stuck).is_err());
    }

    #[test]
    fn test_parse_watch() {
        assert_eq!(parse_watch("0x30").unwrap(), Watchpoint::new(48, WatchKind::Any));
        assert_eq!(parse_watch("100=0xBEEF").unwrap().value, Some(0xBEEF));
        assert!(parse_watch("5=70000").is_err());
        assert!(parse_watch("zz").is_err());
    }

    #[test]
    fn test_diff_against_saved_state() {
        let args = BenchArgs { buffer_scans: Some(4), ..bench_args() };
        let mut bench = Bench::new(AcquisitionConfig::default(), &args).unwrap();
        let path = temp_path("diff.state");
        bench.ctl.save_to_file(&path).unwrap();
        assert!(diff_against_state(&bench.ctl, &path, 8).unwrap().contains("no changes"));

        while bench.ctl.sequencer.scans_completed == 0 {
            bench.step();
        }
        let diff = diff_against_state(&bench.ctl, &path, 8);
        let _ = std::fs::remove_file(&path);
        let diff = diff.unwrap();
        assert!(diff.contains("0x00001 scan 0     ch 1"));
        assert!(diff.contains("more"));
    }
}
