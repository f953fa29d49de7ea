//! WS2812 ring driven from one RMT channel.
//!
//! Every `show` re-encodes the whole 21-pixel frame as RMT pulses and
//! transmits it blocking; at 800 kbit/s that is well under a millisecond.

use anyhow::Context;
use esp_idf_hal::{
    gpio::OutputPin,
    peripheral::Peripheral,
    rmt::{
        config::TransmitConfig, PinState, Pulse, PulseTicks, RmtChannel, TxRmtDriver,
        VariableLengthSignal,
    },
};
use log::warn;

use partybutton_common::{LedMask, LedStrip, PIXEL_COUNT};

// 80 MHz APB / 2 = 25 ns per tick.
const RMT_CLOCK_DIVIDER: u8 = 2;
const T0H_TICKS: u16 = 16;
const T0L_TICKS: u16 = 34;
const T1H_TICKS: u16 = 32;
const T1L_TICKS: u16 = 18;
const BITS_PER_PIXEL: usize = 24;

/// Colour of a lit pixel in wire order (green, red, blue).
const LIT_GRB: [u8; 3] = [0x50, 0xff, 0x10];

enum RingBackend {
    Rmt(TxRmtDriver<'static>),
    Disabled,
}

pub struct RingStrip {
    backend: RingBackend,
    staged: LedMask,
    failed_frames: u64,
}

impl RingStrip {
    pub fn new<C, P>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = P> + 'static,
    ) -> anyhow::Result<Self>
    where
        C: RmtChannel,
        P: OutputPin,
    {
        let config = TransmitConfig::new()
            .clock_divider(RMT_CLOCK_DIVIDER)
            .idle(Some(PinState::Low));

        let tx =
            TxRmtDriver::new(channel, pin, &config).context("failed to init RMT LED driver")?;

        Ok(Self {
            backend: RingBackend::Rmt(tx),
            staged: LedMask::NONE,
            failed_frames: 0,
        })
    }

    pub fn disabled() -> Self {
        Self {
            backend: RingBackend::Disabled,
            staged: LedMask::NONE,
            failed_frames: 0,
        }
    }

    fn transmit(&mut self) -> anyhow::Result<()> {
        let RingBackend::Rmt(tx) = &mut self.backend else {
            return Ok(());
        };

        let zero = [
            Pulse::new(PinState::High, PulseTicks::new(T0H_TICKS)?),
            Pulse::new(PinState::Low, PulseTicks::new(T0L_TICKS)?),
        ];
        let one = [
            Pulse::new(PinState::High, PulseTicks::new(T1H_TICKS)?),
            Pulse::new(PinState::Low, PulseTicks::new(T1L_TICKS)?),
        ];

        let mut signal = VariableLengthSignal::with_capacity(PIXEL_COUNT * BITS_PER_PIXEL * 2);
        for index in 0..PIXEL_COUNT {
            let grb = if self.staged.is_lit(index) {
                LIT_GRB
            } else {
                [0; 3]
            };
            for byte in grb {
                for bit in (0..8).rev() {
                    let pulses = if byte & (1 << bit) != 0 { &one } else { &zero };
                    signal
                        .push(pulses.iter())
                        .context("failed to encode LED frame")?;
                }
            }
        }

        tx.start_blocking(&signal)
            .context("failed to transmit LED frame over RMT")?;
        Ok(())
    }
}

impl LedStrip for RingStrip {
    fn set_pixels(&mut self, mask: &LedMask, additive: bool) {
        self.staged = if additive {
            self.staged.union(*mask)
        } else {
            *mask
        };
    }

    fn clear(&mut self) {
        self.staged = LedMask::NONE;
    }

    fn show(&mut self) {
        if let Err(err) = self.transmit() {
            self.failed_frames = self.failed_frames.saturating_add(1);
            warn!("LED frame dropped ({} so far): {err:#}", self.failed_frames);
        }
    }
}
