// FramePool - lock-free frame pool with dual SPSC queues
//
// Device callbacks on desktop deliver capture samples in chunks whose size
// the host picks. The pool lets the callback hand fixed-size PCM frames to
// the streaming worker without allocating on the audio thread.
//
// Frame flow:
// 1. Callback pops an empty frame from POOL_QUEUE
// 2. Callback fills it with mono i16 samples
// 3. Callback pushes the full frame to DATA_QUEUE
// 4. Streaming worker pops it, copies it out, and returns it to POOL_QUEUE

use rtrb::{Consumer, Producer};

use crate::error::AudioError;

pub const DEFAULT_FRAME_COUNT: usize = 16;

/// One frame of mono PCM samples
pub type AudioFrame = Vec<i16>;

/// Both ends of both queues, split between the callback and the worker
pub struct FramePoolChannels {
    /// Callback side: full frames out
    pub data_producer: Producer<AudioFrame>,
    /// Worker side: full frames in
    pub data_consumer: Consumer<AudioFrame>,
    /// Worker side: empty frames back
    pub pool_producer: Producer<AudioFrame>,
    /// Callback side: empty frames in
    pub pool_consumer: Consumer<AudioFrame>,
}

impl FramePoolChannels {
    /// Separate the halves used by the device callback from the worker's
    pub fn split(self) -> (CallbackChannels, WorkerChannels) {
        (
            CallbackChannels {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
            },
            WorkerChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

pub struct CallbackChannels {
    pub data_producer: Producer<AudioFrame>,
    pub pool_consumer: Consumer<AudioFrame>,
}

pub struct WorkerChannels {
    pub data_consumer: Consumer<AudioFrame>,
    pub pool_producer: Producer<AudioFrame>,
}

/// Pre-allocates every frame up front so the callback never allocates
pub struct FramePool;

impl FramePool {
    /// # Errors
    /// `InvalidBufferSize` when either the frame count or the frame size is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(frame_count: usize, frame_size: usize) -> Result<FramePoolChannels, AudioError> {
        if frame_count == 0 || frame_size == 0 {
            return Err(AudioError::InvalidBufferSize {
                min_frames: frame_size,
                factor: frame_count,
            });
        }

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(frame_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(frame_count);

        for _ in 0..frame_count {
            // Capacity equals frame_count, so the queue cannot be full here
            if pool_producer.push(vec![0_i16; frame_size]).is_err() {
                break;
            }
        }

        Ok(FramePoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        })
    }
}

/// Callback-side accumulator turning host-sized chunks into pool frames
///
/// Samples that arrive while no empty frame is available are dropped and
/// counted; the worker sees the gap as a short read.
pub struct FrameAssembler {
    channels: CallbackChannels,
    current: Option<AudioFrame>,
    filled: usize,
    dropped: u64,
}

impl FrameAssembler {
    pub fn new(channels: CallbackChannels) -> Self {
        Self {
            channels,
            current: None,
            filled: 0,
            dropped: 0,
        }
    }

    pub fn push_sample(&mut self, sample: i16) {
        if self.current.is_none() {
            self.current = self.channels.pool_consumer.pop().ok();
            self.filled = 0;
        }
        let Some(frame) = self.current.as_mut() else {
            self.dropped += 1;
            return;
        };

        frame[self.filled] = sample;
        self.filled += 1;
        if self.filled == frame.len() {
            if let Some(full) = self.current.take() {
                if self.channels.data_producer.push(full).is_err() {
                    self.dropped += 1;
                }
            }
            self.filled = 0;
        }
    }

    /// Samples lost because the worker fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
