//! Per-channel feed task.
//!
//! A running channel keeps both physical buffers of its stream queued. The
//! first pair comes from a private copy of the primary block; every buffer
//! handed back afterwards is refilled from the secondary block, re-read live
//! so the guest can chain blocks without gaps.

use std::sync::Arc;
use std::time::Duration;

use csnd_ir::small_buffer_size;
use tracing::{debug, trace, warn};

use crate::channel::ChannelRegisters;
use crate::memory::GuestMemory;
use crate::output::{BufferSlot, OutputStream, PcmBuffer};
use crate::pcm::{decode_pcm, silent_len};

/// Silence queued when there is no secondary block to refill from.
pub const SILENT_REFILL_SAMPLES: usize = 256;

/// Tuning of the feed loop.
#[derive(Clone, Copy, Debug)]
pub struct FeedConfig {
    /// Longest time the loop blocks before re-checking the playing flag
    pub poll_interval: Duration,
    /// How often a refill is retried when the guest swaps the block mid-copy
    pub generation_retries: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            generation_retries: 4,
        }
    }
}

/// Split a block into its large (leading) and small (trailing) chunks.
pub fn split_block(block: &[u8]) -> (&[u8], &[u8]) {
    let small = small_buffer_size(block.len() as u32) as usize;
    block.split_at(block.len() - small)
}

fn chunk_for(slot: BufferSlot, block: &[u8]) -> &[u8] {
    let (large, small) = split_block(block);
    match slot {
        BufferSlot::Large => large,
        BufferSlot::Small => small,
    }
}

/// The feed loop of one playing channel. Owns the channel's stream while running.
pub struct FeedTask {
    regs: Arc<ChannelRegisters>,
    memory: Arc<dyn GuestMemory>,
    stream: Box<dyn OutputStream>,
    primary: Vec<u8>,
    config: FeedConfig,
    warned_encoding: bool,
}

impl FeedTask {
    pub fn new(
        regs: Arc<ChannelRegisters>,
        memory: Arc<dyn GuestMemory>,
        stream: Box<dyn OutputStream>,
        primary: Vec<u8>,
        config: FeedConfig,
    ) -> Self {
        Self {
            regs,
            memory,
            stream,
            primary,
            config,
            warned_encoding: false,
        }
    }

    /// Feed until the channel's playing flag drops, then hand the stream back.
    pub fn run(mut self) -> Box<dyn OutputStream> {
        let channel = self.regs.index();
        debug!(channel, bytes = self.primary.len(), "feed task started");

        let primary = std::mem::take(&mut self.primary);
        for slot in BufferSlot::BOTH {
            self.queue_bytes(slot, chunk_for(slot, &primary));
        }
        self.keep_playing();

        while self.regs.is_playing() {
            match self.stream.wait_processed(self.config.poll_interval) {
                Ok(Some(slot)) => {
                    self.refill(slot);
                    self.keep_playing();
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(channel, error = %e, "output stream wait failed");
                    std::thread::sleep(self.config.poll_interval);
                }
            }
        }

        debug!(channel, "feed task finished");
        self.stream
    }

    /// Restart the stream if it stopped (starved) while the channel still plays.
    fn keep_playing(&mut self) {
        if self.regs.is_playing() && !self.stream.is_playing() {
            trace!(channel = self.regs.index(), "restarting stream");
            if let Err(e) = self.stream.play() {
                warn!(channel = self.regs.index(), error = %e, "failed to start stream");
            }
        }
    }

    fn refill(&mut self, slot: BufferSlot) {
        match self.read_secondary() {
            Some(block) => self.queue_bytes(slot, chunk_for(slot, &block)),
            None => self.queue_samples(slot, &[0; SILENT_REFILL_SAMPLES]),
        }
    }

    /// Copy the current secondary block out of guest memory.
    ///
    /// The copy is only accepted if the block register's generation did not
    /// move while copying.
    fn read_secondary(&self) -> Option<Vec<u8>> {
        let channel = self.regs.index();
        for _ in 0..=self.config.generation_retries {
            let (block, generation) = self.regs.secondary.load_versioned();
            if !block.is_playable() {
                trace!(channel, "no secondary block to refill from");
                return None;
            }

            let bytes = match self.memory.read_vec(block.addr, block.size as usize) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(channel, error = %e, "secondary block unreadable");
                    return None;
                }
            };

            if self.regs.secondary.generation() == generation {
                return Some(bytes);
            }
            trace!(channel, "secondary block changed during refill, retrying");
        }
        warn!(channel, "secondary block kept changing, refilling with silence");
        None
    }

    fn queue_bytes(&mut self, slot: BufferSlot, bytes: &[u8]) {
        let encoding = self.regs.encoding();
        match decode_pcm(bytes, encoding) {
            Some(samples) => self.queue_samples(slot, &samples),
            None => {
                if !self.warned_encoding {
                    warn!(channel = self.regs.index(), ?encoding, "unsupported encoding, output is silent");
                    self.warned_encoding = true;
                }
                let silence = vec![0i16; silent_len(bytes.len())];
                self.queue_samples(slot, &silence);
            }
        }
    }

    fn queue_samples(&mut self, slot: BufferSlot, samples: &[i16]) {
        let buffer = PcmBuffer {
            samples,
            sample_rate: self.regs.sample_rate(),
            interpolation: self.regs.interpolation(),
        };
        if let Err(e) = self.stream.queue(slot, buffer) {
            warn!(channel = self.regs.index(), ?slot, error = %e, "failed to queue buffer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::BlockRef;
    use crate::memory::{GuestMemoryError, VecGuestMemory};
    use crate::testing::{wait_for, InstantStream};
    use csnd_ir::Encoding;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    const PHYS: u32 = 0x2000_0000;
    const VIRT: u32 = 0x1400_0000;

    fn setup() -> (Arc<ChannelRegisters>, Arc<VecGuestMemory>) {
        let regs = Arc::new(ChannelRegisters::new(0));
        regs.set_encoding(Encoding::Pcm8);
        regs.set_sample_rate(8000);
        let memory = Arc::new(VecGuestMemory::new(PHYS, VIRT, 0x1000));
        (regs, memory)
    }

    fn pcm8(samples: &[u8]) -> Vec<i16> {
        samples.iter().map(|&b| (b as i8 as i16) << 8).collect()
    }

    #[test]
    fn split_block_follows_small_buffer_rule() {
        let block = [0u8; 3000];
        let (large, small) = split_block(&block);
        assert_eq!((large.len(), small.len()), (1976, 1024));

        let block = [0u8; 2100];
        let (large, small) = split_block(&block);
        assert_eq!((large.len(), small.len()), (1076, 1024));

        let block = [0u8; 5];
        let (large, small) = split_block(&block);
        assert_eq!((large.len(), small.len()), (5, 0));
    }

    #[test]
    fn primary_copy_then_secondary_refills_in_order() {
        let (regs, memory) = setup();
        let secondary: Vec<u8> = (100..120).collect();
        memory.write_phys(PHYS + 0x100, &secondary).unwrap();
        regs.secondary.store(BlockRef { addr: VIRT + 0x100, size: 20 });
        regs.set_playing(true);

        let (stream, log) = InstantStream::with_budget(6);
        let primary: Vec<u8> = (1..=12).collect();
        let task = FeedTask::new(regs.clone(), memory, Box::new(stream), primary, FeedConfig::default());
        let handle = thread::spawn(move || task.run());

        assert!(wait_for(|| log.lock().unwrap().queued.len() >= 6));
        regs.set_playing(false);
        handle.join().unwrap();

        let log = log.lock().unwrap();
        let queued: Vec<_> = log.queued.iter().map(|q| (q.slot, q.samples.clone())).collect();
        assert_eq!(queued[0], (BufferSlot::Large, pcm8(&[1, 2, 3, 4, 5, 6])));
        assert_eq!(queued[1], (BufferSlot::Small, pcm8(&[7, 8, 9, 10, 11, 12])));
        assert_eq!(queued[2], (BufferSlot::Large, pcm8(&secondary[..10])));
        assert_eq!(queued[3], (BufferSlot::Small, pcm8(&secondary[10..])));
        assert_eq!(queued[4], queued[2]);
        assert_eq!(queued[5], queued[3]);
        assert!(log.queued.iter().all(|q| q.sample_rate == 8000));
        assert!(log.queued.iter().all(|q| q.interpolation == regs.interpolation()));
        assert!(log.plays >= 1);
    }

    #[test]
    fn missing_secondary_refills_with_silence() {
        let (regs, memory) = setup();
        regs.set_playing(true);

        let (stream, log) = InstantStream::with_budget(3);
        let task = FeedTask::new(regs.clone(), memory, Box::new(stream), vec![1; 16], FeedConfig::default());
        let handle = thread::spawn(move || task.run());

        assert!(wait_for(|| log.lock().unwrap().queued.len() >= 3));
        regs.set_playing(false);
        handle.join().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.queued[2].samples, vec![0; SILENT_REFILL_SAMPLES]);
    }

    #[test]
    fn unsupported_encoding_queues_silence_of_block_length() {
        let (regs, memory) = setup();
        regs.set_encoding(Encoding::ImaAdpcm);
        regs.set_playing(true);

        let (stream, log) = InstantStream::with_budget(2);
        let task = FeedTask::new(regs.clone(), memory, Box::new(stream), vec![0x55; 40], FeedConfig::default());
        let handle = thread::spawn(move || task.run());

        assert!(wait_for(|| log.lock().unwrap().queued.len() >= 2));
        regs.set_playing(false);
        handle.join().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.queued[0].samples, vec![0; 10]);
        assert_eq!(log.queued[1].samples, vec![0; 10]);
    }

    /// Points the secondary register at `next` right after the first read
    /// of `from`, like a guest chaining a new block mid-copy.
    struct SwappingMemory {
        inner: VecGuestMemory,
        regs: Arc<ChannelRegisters>,
        from: u32,
        next: BlockRef,
        swapped: AtomicBool,
    }

    impl GuestMemory for SwappingMemory {
        fn translate(&self, phys_addr: u32) -> Option<u32> {
            self.inner.translate(phys_addr)
        }

        fn read(&self, addr: u32, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
            let result = self.inner.read(addr, dst);
            if addr == self.from && !self.swapped.swap(true, Ordering::SeqCst) {
                self.regs.secondary.store(self.next);
            }
            result
        }

        fn contains(&self, addr: u32, len: usize) -> bool {
            self.inner.contains(addr, len)
        }
    }

    #[test]
    fn block_swapped_during_copy_is_reread() {
        let regs = Arc::new(ChannelRegisters::new(0));
        regs.set_encoding(Encoding::Pcm8);
        regs.set_sample_rate(8000);

        let inner = VecGuestMemory::new(PHYS, VIRT, 0x1000);
        let old: Vec<u8> = (100..120).collect();
        let new: Vec<u8> = (200..220).collect();
        inner.write_phys(PHYS + 0x100, &old).unwrap();
        inner.write_phys(PHYS + 0x200, &new).unwrap();
        regs.secondary.store(BlockRef { addr: VIRT + 0x100, size: 20 });
        let memory = Arc::new(SwappingMemory {
            inner,
            regs: regs.clone(),
            from: VIRT + 0x100,
            next: BlockRef { addr: VIRT + 0x200, size: 20 },
            swapped: AtomicBool::new(false),
        });
        regs.set_playing(true);

        let (stream, log) = InstantStream::with_budget(4);
        let task = FeedTask::new(regs.clone(), memory.clone(), Box::new(stream), vec![1; 20], FeedConfig::default());
        let handle = thread::spawn(move || task.run());

        assert!(wait_for(|| log.lock().unwrap().queued.len() >= 4));
        regs.set_playing(false);
        handle.join().unwrap();

        assert!(memory.swapped.load(Ordering::SeqCst));
        let log = log.lock().unwrap();
        assert_eq!(log.queued[2].samples, pcm8(&new[..10]));
        assert_eq!(log.queued[3].samples, pcm8(&new[10..]));
    }

    #[test]
    fn output_errors_are_survived() {
        let (regs, memory) = setup();
        regs.set_playing(true);

        // The first (large) buffer is refused and the first two waits fail.
        let (stream, log) = InstantStream::faulty(4, 1, 2);
        let task = FeedTask::new(regs.clone(), memory, Box::new(stream), vec![1; 16], FeedConfig::default());
        let handle = thread::spawn(move || task.run());

        assert!(wait_for(|| log.lock().unwrap().queued.len() >= 3));
        assert!(!handle.is_finished());
        regs.set_playing(false);
        handle.join().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.errors, 3);
        assert_eq!(log.queued[0].slot, BufferSlot::Small);
        assert_eq!(log.queued[1].samples, vec![0; SILENT_REFILL_SAMPLES]);
    }

    #[test]
    fn stream_is_restarted_after_starving() {
        let (regs, memory) = setup();
        memory.write_phys(PHYS, &[9; 8]).unwrap();
        regs.secondary.store(BlockRef { addr: VIRT, size: 8 });
        regs.set_playing(true);

        let (stream, log) = InstantStream::starving(5);
        let task = FeedTask::new(regs.clone(), memory, Box::new(stream), vec![1; 8], FeedConfig::default());
        let handle = thread::spawn(move || task.run());

        assert!(wait_for(|| log.lock().unwrap().queued.len() >= 5));
        regs.set_playing(false);
        let stream = handle.join().unwrap();

        // One play at start, one more after every starved hand-back.
        assert!(log.lock().unwrap().plays >= 3);
        drop(stream);
    }
}
