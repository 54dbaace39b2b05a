//! csnd CLI: stream a WAV file through the mixer core.
//!
//! The CLI plays the guest: it copies the audio into guest memory as a run
//! of sound blocks, writes command lists into the session's shared memory
//! and executes them.
//!
//! Usage:
//!   csnd-cli input.wav                      play on the default device
//!   csnd-cli input.wav --output out.wav     render offline through the engine

mod wav;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use csnd_audio::{CaptureDevice, CpalDevice};
use csnd_engine::{GuestMemory, OutputDevice, SharedMemory, VecGuestMemory};
use csnd_ir::{
    raw_rate_for, ChannelFlags, CommandListBuilder, Encoding, Interpolation, RepeatMode,
    VolumePair, BLOCK_HEADER_SIZE, CHANNEL_COUNT,
};
use csnd_service::{LocalKernel, MixerSession, SessionConfig};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const GUEST_PHYS_BASE: u32 = 0x2000_0000;
const GUEST_VIRT_BASE: u32 = 0x1400_0000;
const SHARED_MEMORY_SIZE: u32 = 0x1000;
/// Command lists are written here inside shared memory.
const LIST_OFFSET: u16 = 0x40;

#[derive(Parser, Debug)]
#[command(name = "csnd-cli", about = "Stream a WAV file through the csnd mixer core")]
struct Args {
    /// Input WAV file (8 or 16 bit PCM, mono or stereo)
    input: PathBuf,

    /// Channel to play on (0-31)
    #[arg(short, long, default_value_t = 8)]
    channel: u8,

    /// Render offline to this WAV file instead of playing
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short, long)]
    seconds: Option<f32>,

    /// Size of each guest sound block in bytes
    #[arg(long, default_value_t = 0x2000)]
    chunk: u32,

    /// Loop the input until --seconds elapse
    #[arg(long = "loop")]
    looping: bool,

    /// Hold samples instead of interpolating between them
    #[arg(long)]
    no_interpolation: bool,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(spec) => EnvFilter::new(spec),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if args.channel as usize >= CHANNEL_COUNT {
        bail!("channel must be below {CHANNEL_COUNT}");
    }
    if args.chunk < 4 || args.chunk % 2 != 0 {
        bail!("chunk size must be an even number of at least 4 bytes");
    }

    let data = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let pcm = wav::load_wav(&data)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    if pcm.samples.is_empty() {
        bail!("{} contains no audio", args.input.display());
    }
    info!(
        samples = pcm.samples.len(),
        rate = pcm.sample_rate,
        seconds = pcm.samples.len() as f32 / pcm.sample_rate as f32,
        "input loaded"
    );

    match &args.output {
        Some(path) => render(&args, &pcm, path),
        None => play(&args, &pcm),
    }
}

/// Audio laid out in guest memory as consecutive sound blocks.
struct GuestAudio {
    memory: Arc<VecGuestMemory>,
    /// Physical address of each block header
    blocks: Vec<u32>,
    block_size: u32,
}

impl GuestAudio {
    /// Split `samples` into blocks of `block_size` bytes, each preceded by
    /// a block header.
    fn load(samples: &[i16], block_size: u32) -> Result<Self> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let stride = (BLOCK_HEADER_SIZE + block_size) as usize;
        let count = bytes.len().div_ceil(block_size as usize);
        let memory = Arc::new(VecGuestMemory::new(GUEST_PHYS_BASE, GUEST_VIRT_BASE, count * stride));

        let mut blocks = Vec::with_capacity(count);
        for (i, chunk) in bytes.chunks(block_size as usize).enumerate() {
            let header = GUEST_PHYS_BASE + (i * stride) as u32;
            memory.write_phys(header + BLOCK_HEADER_SIZE, chunk)?;
            blocks.push(header);
        }
        debug!(blocks = blocks.len(), block_size, "guest audio laid out");
        Ok(Self {
            memory,
            blocks,
            block_size,
        })
    }

    fn guest_memory(&self) -> Arc<dyn GuestMemory> {
        self.memory.clone()
    }
}

/// Write `list` into shared memory and execute it.
fn submit(session: &mut MixerSession, list: &CommandListBuilder) -> Result<()> {
    let shared = session
        .shared_memory()
        .context("session not initialized")?
        .clone();
    shared.write(list.start_offset() as usize, &list.encode()?)?;
    let report = session.execute_commands(list.start_offset() as u32)?;
    debug!(?report, "list submitted");
    Ok(())
}

fn start_session(audio: &GuestAudio, device: Box<dyn OutputDevice>) -> Result<MixerSession> {
    let mut session = MixerSession::new(
        SessionConfig::default(),
        Box::new(LocalKernel::new()),
        audio.guest_memory(),
        device,
    );
    let response = session.initialize(SHARED_MEMORY_SIZE, [0, 0x100, 0x200, 0x300])?;
    debug!(?response, channels = format_args!("{:#x}", session.acquire_sound_channels()), "session ready");
    Ok(session)
}

fn channel_flags(args: &Args, sample_rate: u32, playback: bool) -> ChannelFlags {
    ChannelFlags {
        channel: args.channel,
        interpolation: if args.no_interpolation {
            Interpolation::Disabled
        } else {
            Interpolation::Enabled
        },
        repeat_mode: RepeatMode::Normal,
        encoding: Encoding::Pcm16,
        playback,
        raw_rate: raw_rate_for(sample_rate),
    }
}

/// Real-time playback: the CLI advances the secondary block once per block
/// duration, the way a guest chains blocks.
fn play(args: &Args, pcm: &wav::MonoPcm) -> Result<()> {
    let audio = GuestAudio::load(&pcm.samples, args.chunk)?;
    let device = CpalDevice::new().context("failed to open audio device")?;
    info!(rate = device.sample_rate(), "playing on default device");
    let mut session = start_session(&audio, Box::new(device))?;

    let block_duration =
        Duration::from_secs_f64((audio.block_size / 2) as f64 / pcm.sample_rate as f64);
    let limit = args.seconds.map(|s| Duration::from_secs_f32(s.max(0.0)));
    let next_block = |i: usize| -> Option<u32> {
        match audio.blocks.get(i) {
            Some(&b) => Some(b),
            None if args.looping => Some(audio.blocks[i % audio.blocks.len()]),
            None => None,
        }
    };

    let mut list = CommandListBuilder::at(LIST_OFFSET);
    list.set_channel_regs(
        channel_flags(args, pcm.sample_rate, true),
        VolumePair { left: 0xFFFF, right: 0xFFFF },
        VolumePair::default(),
        audio.blocks[0],
        next_block(1).unwrap_or(0),
        audio.block_size,
    );
    submit(&mut session, &list)?;

    let started = Instant::now();
    let mut index = 1;
    loop {
        // Both chunks of block `index` are queued once block `index - 1`
        // ends; move the secondary on before its large chunk comes back.
        let due = started + block_duration.mul_f64(index as f64 + 0.25);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
        if limit.is_some_and(|l| started.elapsed() >= l) {
            break;
        }
        index += 1;
        match next_block(index) {
            Some(block) => {
                let mut list = CommandListBuilder::at(LIST_OFFSET);
                list.set_block(block, audio.block_size);
                submit(&mut session, &list)?;
            }
            None => {
                // Let the last block drain.
                std::thread::sleep(block_duration);
                break;
            }
        }
    }

    let mut list = CommandListBuilder::at(LIST_OFFSET);
    list.set_play_state(args.channel, false);
    submit(&mut session, &list)?;
    session.shutdown();
    info!(elapsed = ?started.elapsed(), "done");
    Ok(())
}

/// Offline render through the capture device. The whole input is one block;
/// with `--loop` it is also the secondary block and repeats.
fn render(args: &Args, pcm: &wav::MonoPcm, path: &Path) -> Result<()> {
    let block_size = (pcm.samples.len() * 2) as u32;
    let audio = GuestAudio::load(&pcm.samples, block_size)?;

    let wanted = match args.seconds {
        Some(s) => (s.max(0.0) * pcm.sample_rate as f32) as usize,
        None => pcm.samples.len(),
    };
    let device = CaptureDevice::new().with_limit(wanted);
    let captures = device.handle();
    let mut session = start_session(&audio, Box::new(device))?;

    let mut list = CommandListBuilder::at(LIST_OFFSET);
    list.set_channel_regs(
        channel_flags(args, pcm.sample_rate, true),
        VolumePair { left: 0xFFFF, right: 0xFFFF },
        VolumePair::default(),
        audio.blocks[0],
        if args.looping { audio.blocks[0] } else { 0 },
        block_size,
    );
    submit(&mut session, &list)?;

    let channel = args.channel as usize;
    let deadline = Instant::now() + Duration::from_secs(30);
    while captures.samples(channel).len() < wanted {
        if Instant::now() >= deadline {
            bail!("render stalled on channel {channel}");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    session.shutdown();

    let recording = captures
        .recording(channel)
        .context("channel stream was never opened")?;
    let mut out = Vec::new();
    wav::write_wav(&mut out, &recording.samples, recording.sample_rate)?;
    fs::write(path, &out).with_context(|| format!("failed to write {}", path.display()))?;
    info!(
        path = %path.display(),
        samples = recording.samples.len(),
        rate = recording.sample_rate,
        "rendered"
    );
    Ok(())
}
