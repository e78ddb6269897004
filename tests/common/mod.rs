//! Simulated SD card answering the SPI byte stream.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};

use sdspi::{SdSpiConfig, Transport};

pub const BLOCK: usize = 512;

/// Card OCR with the supply window bits and power up done.
const OCR_BASE: u32 = 0x80FF_8000;
const OCR_CCS: u32 = 1 << 30;
/// Data response token for an accepted block.
const DATA_ACCEPTED: u8 = 0xE5;
/// Data response token for a block with a bad CRC.
const DATA_CRC_ERROR: u8 = 0xEB;
/// Byte the card puts on the bus right after STOP_TRANSMISSION.
const STUFF_BYTE: u8 = 0x3C;

/// Low ceilings so failures surface quickly.
pub struct TestConfig;

impl SdSpiConfig for TestConfig {
    const TRANSFER_RETRY_TIMES: usize = 64;
    const RESPONSE_ATTEMPTS: usize = 9;
    const GO_IDLE_ATTEMPTS: usize = 8;
    const IF_COND_ATTEMPTS: usize = 8;
    const OP_COND_ATTEMPTS: usize = 16;
    const SET_BLOCK_SIZE_ATTEMPTS: usize = 8;
    const CRC_PROTECTION: bool = false;
}

/// [`TestConfig`] with CRC protection.
pub struct CrcConfig;

impl SdSpiConfig for CrcConfig {
    const TRANSFER_RETRY_TIMES: usize = 64;
    const RESPONSE_ATTEMPTS: usize = 9;
    const GO_IDLE_ATTEMPTS: usize = 8;
    const IF_COND_ATTEMPTS: usize = 8;
    const OP_COND_ATTEMPTS: usize = 16;
    const SET_BLOCK_SIZE_ATTEMPTS: usize = 8;
    const CRC_PROTECTION: bool = true;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

/// What the card saw on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Init,
    Frequency(u32),
    Command(u8, u32),
    DataBlock,
    StopToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighSpeed {
    Unsupported,
    Supported,
    Refused,
}

enum Mode {
    Command,
    ReadMultiple {
        next: u32,
    },
    Write {
        multiple: bool,
        next: u32,
        data: Option<Vec<u8>>,
    },
}

pub struct SimCard {
    pub trace: Vec<Event>,
    pub high_capacity: bool,
    /// Answers SEND_IF_COND with illegal command.
    pub legacy: bool,
    pub voltage_accepted: bool,
    pub csd: [u8; 16],
    pub cid: [u8; 16],
    pub scr: [u8; 8],
    /// ACMD41 polls answered with the idle flag before the card is ready.
    pub idle_polls: usize,
    /// R1 sent for GO_IDLE_STATE.
    pub go_idle_response: u8,
    /// Command index that never gets an answer.
    pub mute: Option<u8>,
    /// Token sent back for every written block instead of "accepted".
    pub data_response: Option<u8>,
    /// Second byte of SEND_STATUS.
    pub status_byte: u8,
    pub high_speed: HighSpeed,
    /// Block whose data is sent with a broken CRC.
    pub corrupt_crc_block: Option<u32>,
    pub fail_init: bool,
    pub fail_frequency: Option<u32>,
    /// The bus breaks right after this command.
    pub fail_after_command: Option<u8>,
    pub blocks: BTreeMap<u32, Vec<u8>>,
    /// The card stays busy for good once this command is answered.
    pub busy_after: Option<u8>,
    /// Read commands are answered but no data block follows.
    pub withhold_data: bool,
    /// Token sent in place of every read data block.
    pub data_error_token: Option<u8>,
    /// Busy bytes the host clocked out of a stuck card.
    pub busy_polls: usize,
    /// Idle bytes seen before the first command frame.
    pub idle_bytes_before_reset: usize,

    idle: bool,
    busy: bool,
    app: bool,
    crc_enabled: bool,
    polls: usize,
    selected_speed: u8,
    erase_start: u32,
    erase_end: u32,
    broken: bool,
    frame: Vec<u8>,
    out: VecDeque<u8>,
    mode: Mode,
}

impl SimCard {
    fn new(high_capacity: bool, csd: [u8; 16]) -> Self {
        SimCard {
            trace: Vec::new(),
            high_capacity,
            legacy: false,
            voltage_accepted: true,
            csd,
            cid: [
                0x03, 0x53, 0x44, 0x53, 0x55, 0x30, 0x32, 0x47, 0x80, 0x13, 0x8C, 0x3A, 0x4B,
                0x00, 0xD6, 0xF1,
            ],
            scr: [0x02, 0x35, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00],
            idle_polls: 2,
            go_idle_response: 0x01,
            mute: None,
            data_response: None,
            status_byte: 0x00,
            high_speed: HighSpeed::Supported,
            corrupt_crc_block: None,
            fail_init: false,
            fail_frequency: None,
            fail_after_command: None,
            blocks: BTreeMap::new(),
            busy_after: None,
            withhold_data: false,
            data_error_token: None,
            busy_polls: 0,
            idle_bytes_before_reset: 0,
            idle: true,
            busy: false,
            app: false,
            crc_enabled: false,
            polls: 0,
            selected_speed: 0,
            erase_start: 0,
            erase_end: 0,
            broken: false,
            frame: Vec::new(),
            out: VecDeque::new(),
            mode: Mode::Command,
        }
    }

    /// 3.7 GiB high capacity card.
    pub fn sdhc() -> Self {
        SimCard::new(true, csd_v2(7529))
    }

    /// 1 GB standard capacity card.
    pub fn sdsc() -> Self {
        SimCard::new(false, csd_v1(3874, 7))
    }

    /// Standard capacity card that predates SEND_IF_COND.
    pub fn legacy() -> Self {
        SimCard {
            legacy: true,
            ..SimCard::sdsc()
        }
    }

    /// Content of a block, written or initial.
    pub fn block(&self, index: u32) -> Vec<u8> {
        self.blocks
            .get(&index)
            .cloned()
            .unwrap_or_else(|| pattern(index))
    }

    /// Arguments of every received command with this index.
    pub fn args_of(&self, index: u8) -> Vec<u32> {
        self.trace
            .iter()
            .filter_map(|event| match event {
                Event::Command(i, arg) if *i == index => Some(*arg),
                _ => None,
            })
            .collect()
    }

    /// Indexes of the received commands, in order.
    pub fn command_indexes(&self) -> Vec<u8> {
        self.trace
            .iter()
            .filter_map(|event| match event {
                Event::Command(i, _) => Some(*i),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: Event) -> usize {
        self.trace.iter().filter(|e| **e == event).count()
    }

    /// Trace from the first occurrence of `index` on.
    pub fn trace_from(&self, index: u8) -> Vec<Event> {
        let start = self
            .trace
            .iter()
            .position(|e| matches!(e, Event::Command(i, _) if *i == index))
            .unwrap_or(self.trace.len());
        self.trace[start..].to_vec()
    }

    fn r1(&self) -> u8 {
        u8::from(self.idle)
    }

    fn respond(&mut self, bytes: &[u8]) {
        self.out.push_back(0xFF);
        self.out.extend(bytes);
    }

    fn send_block(&mut self, data: &[u8], corrupt: bool) {
        let mut crc = crc16(data);
        if corrupt {
            crc ^= 0x0101;
        }
        self.out.push_back(0xFF);
        self.out.push_back(0xFE);
        self.out.extend(data);
        self.out.extend(crc.to_be_bytes());
    }

    fn block_index(&self, arg: u32) -> u32 {
        if self.high_capacity {
            arg
        } else {
            arg / BLOCK as u32
        }
    }

    fn send_stored_block(&mut self, index: u32) {
        if let Some(token) = self.data_error_token {
            self.out.extend([0xFF, token]);
            return;
        }
        let data = self.block(index);
        self.send_block(&data, self.corrupt_crc_block == Some(index));
    }

    fn switch_status(&mut self, arg: u32) -> Vec<u8> {
        let set = arg >> 31 == 1;
        let request = (arg & 0x0F) as u8;
        let supported = self.high_speed != HighSpeed::Unsupported;

        let mut selected = match request {
            0x0F => self.selected_speed,
            1 if supported => 1,
            0 => 0,
            _ => 0x0F,
        };
        if set {
            if self.high_speed == HighSpeed::Refused {
                selected = 0x0F;
            } else if selected != 0x0F {
                self.selected_speed = selected;
            }
        }

        let mut data = vec![0u8; 64];
        data[1] = 100;
        data[12] = 0x80;
        data[13] = if supported { 0x03 } else { 0x01 };
        data[16] = selected;
        data
    }

    fn command(&mut self, frame: [u8; 6]) {
        let index = frame[0] & 0x3F;
        let arg = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
        self.trace.push(Event::Command(index, arg));

        if self.fail_after_command == Some(index) {
            self.broken = true;
        }
        if self.busy_after == Some(index) {
            self.busy = true;
        }

        let app = std::mem::replace(&mut self.app, false);

        if self.mute == Some(index) {
            return;
        }

        if self.crc_enabled && frame[5] != (crc7(&frame[..5]) << 1) | 1 {
            self.respond(&[self.r1() | 0x08]);
            return;
        }

        match (index, app) {
            (0, _) => {
                self.idle = true;
                self.polls = 0;
                self.crc_enabled = false;
                self.mode = Mode::Command;
                self.respond(&[self.go_idle_response]);
            }
            (6, _) => {
                let status = self.switch_status(arg);
                self.respond(&[0x00]);
                self.send_block(&status, false);
            }
            (8, _) if self.legacy => self.respond(&[0x05]),
            (8, _) => {
                let voltage = if self.voltage_accepted { 0x01 } else { 0x00 };
                self.respond(&[self.r1(), 0x00, 0x00, voltage, frame[4]]);
            }
            (9, _) => {
                let csd = self.csd;
                self.respond(&[0x00]);
                self.send_block(&csd, false);
            }
            (10, _) => {
                let cid = self.cid;
                self.respond(&[0x00]);
                self.send_block(&cid, false);
            }
            (12, _) => {
                self.mode = Mode::Command;
                self.out.clear();
                self.out.extend([STUFF_BYTE, 0x00, 0x00, 0x00]);
            }
            (13, _) => self.respond(&[0x00, self.status_byte]),
            (16, _) => self.respond(&[self.r1()]),
            (17, _) => {
                self.respond(&[0x00]);
                if !self.withhold_data {
                    self.send_stored_block(self.block_index(arg));
                }
            }
            (18, _) if self.withhold_data => self.respond(&[0x00]),
            (18, _) => {
                let first = self.block_index(arg);
                self.respond(&[0x00]);
                self.send_stored_block(first);
                self.mode = Mode::ReadMultiple { next: first + 1 };
            }
            (23, true) => self.respond(&[0x00]),
            (24, _) | (25, _) => {
                self.respond(&[0x00]);
                self.mode = Mode::Write {
                    multiple: index == 25,
                    next: self.block_index(arg),
                    data: None,
                };
            }
            (32, _) => {
                self.erase_start = self.block_index(arg);
                self.respond(&[0x00]);
            }
            (33, _) => {
                self.erase_end = self.block_index(arg);
                self.respond(&[0x00]);
            }
            (38, _) => {
                for block in self.erase_start..=self.erase_end {
                    self.blocks.insert(block, vec![0; BLOCK]);
                }
                self.respond(&[0x00, 0x00, 0x00]);
            }
            (41, true) => {
                if self.polls < self.idle_polls {
                    self.polls += 1;
                } else {
                    self.idle = false;
                }
                self.respond(&[self.r1()]);
            }
            (51, true) => {
                let scr = self.scr;
                self.respond(&[0x00]);
                self.send_block(&scr, false);
            }
            (55, _) => {
                self.app = true;
                self.respond(&[self.r1()]);
            }
            (58, _) => {
                let ocr = if self.high_capacity {
                    OCR_BASE | OCR_CCS
                } else {
                    OCR_BASE
                };
                let [o3, o2, o1, o0] = ocr.to_be_bytes();
                self.respond(&[self.r1(), o3, o2, o1, o0]);
            }
            (59, _) => {
                self.crc_enabled = arg & 1 == 1;
                self.respond(&[self.r1()]);
            }
            _ => self.respond(&[self.r1() | 0x04]),
        }
    }

    fn command_byte(&mut self, byte: u8) {
        if self.frame.is_empty() && byte & 0xC0 != 0x40 {
            if byte == 0xFF && !self.trace.iter().any(|e| matches!(e, Event::Command(..))) {
                self.idle_bytes_before_reset += 1;
            }
            return;
        }

        self.frame.push(byte);
        if self.frame.len() == 6 {
            let mut frame = [0u8; 6];
            frame.copy_from_slice(&self.frame);
            self.frame.clear();
            self.command(frame);
        }
    }

    fn write_byte(&mut self, byte: u8) {
        let (multiple, index, collecting) = match &self.mode {
            Mode::Write {
                multiple,
                next,
                data,
            } => (*multiple, *next, data.is_some()),
            _ => return,
        };

        if !collecting {
            match byte {
                0xFE if !multiple => self.start_block(multiple, index),
                0xFC if multiple => self.start_block(multiple, index),
                0xFD if multiple => {
                    self.trace.push(Event::StopToken);
                    self.out.extend([0x00, 0x00]);
                    self.mode = Mode::Command;
                }
                _ => {}
            }
            return;
        }

        let Mode::Write {
            data: Some(buf), ..
        } = &mut self.mode
        else {
            return;
        };
        buf.push(byte);
        if buf.len() < BLOCK + 2 {
            return;
        }

        let buf = std::mem::take(buf);
        self.mode = if multiple {
            Mode::Write {
                multiple,
                next: index + 1,
                data: None,
            }
        } else {
            Mode::Command
        };

        self.trace.push(Event::DataBlock);

        let block = buf[..BLOCK].to_vec();
        let crc = u16::from_be_bytes([buf[BLOCK], buf[BLOCK + 1]]);
        let response = if let Some(response) = self.data_response {
            response
        } else if self.crc_enabled && crc != crc16(&block) {
            DATA_CRC_ERROR
        } else {
            self.blocks.insert(index, block);
            DATA_ACCEPTED
        };
        self.out.extend([response, 0x00, 0x00]);
    }

    fn start_block(&mut self, multiple: bool, next: u32) {
        self.mode = Mode::Write {
            multiple,
            next,
            data: Some(Vec::new()),
        };
    }

    fn clock(&mut self, byte: u8) -> u8 {
        let out = match self.out.pop_front() {
            Some(byte) => byte,
            None if self.busy => {
                self.busy_polls += 1;
                0x00
            }
            None => 0xFF,
        };

        match self.mode {
            Mode::Command => self.command_byte(byte),
            Mode::ReadMultiple { next } => {
                self.command_byte(byte);
                if matches!(self.mode, Mode::ReadMultiple { .. })
                    && self.frame.is_empty()
                    && self.out.is_empty()
                {
                    self.send_stored_block(next);
                    self.mode = Mode::ReadMultiple { next: next + 1 };
                }
            }
            Mode::Write { .. } => self.write_byte(byte),
        }

        out
    }
}

impl Transport for SimCard {
    type Error = SimError;

    fn init(&mut self) -> Result<(), SimError> {
        if self.fail_init {
            return Err(SimError);
        }
        self.trace.push(Event::Init);
        Ok(())
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), SimError> {
        if self.fail_frequency == Some(hz) {
            return Err(SimError);
        }
        self.trace.push(Event::Frequency(hz));
        Ok(())
    }

    fn exchange(&mut self, tx: Option<&[u8]>, rx: Option<&mut [u8]>) -> Result<(), SimError> {
        if self.broken {
            return Err(SimError);
        }

        match (tx, rx) {
            (Some(tx), Some(rx)) => {
                assert_eq!(tx.len(), rx.len());
                for (t, r) in tx.iter().zip(rx.iter_mut()) {
                    *r = self.clock(*t);
                }
            }
            (Some(tx), None) => {
                for t in tx {
                    self.clock(*t);
                }
            }
            (None, Some(rx)) => {
                for r in rx.iter_mut() {
                    *r = self.clock(0xFF);
                }
            }
            (None, None) => {}
        }

        Ok(())
    }
}

/// Initial content of a block.
pub fn pattern(index: u32) -> Vec<u8> {
    (0..BLOCK)
        .map(|i| (i as u32).wrapping_mul(7).wrapping_add(index) as u8)
        .collect()
}

/// Version 2 CSD: 25 MHz, command classes including switch, 128-block
/// erase sectors.
pub fn csd_v2(device_size: u32) -> [u8; 16] {
    let mut raw: u128 = 1 << 126;
    raw |= 0x0E << 112;
    raw |= 0x32 << 96;
    raw |= 0x5B5 << 84;
    raw |= 9 << 80;
    raw |= u128::from(device_size) << 48;
    raw |= 1 << 46;
    raw |= 0x7F << 39;
    raw |= 9 << 22;
    raw |= 1;
    raw.to_be_bytes()
}

/// Version 1 CSD: 25 MHz, command classes including switch, 32-block erase
/// sectors.
pub fn csd_v1(device_size: u16, multiplier: u8) -> [u8; 16] {
    let mut raw: u128 = 0;
    raw |= 0x26 << 112;
    raw |= 0x32 << 96;
    raw |= 0x5B5 << 84;
    raw |= 9 << 80;
    raw |= u128::from(device_size) << 62;
    raw |= u128::from(multiplier) << 47;
    raw |= 1 << 46;
    raw |= 0x1F << 39;
    raw |= 9 << 22;
    raw |= 1;
    raw.to_be_bytes()
}

/// Replaces a CSD field.
pub fn with_field(csd: [u8; 16], shift: u32, width: u32, value: u128) -> [u8; 16] {
    let mask = ((1u128 << width) - 1) << shift;
    let raw = (u128::from_be_bytes(csd) & !mask) | ((value << shift) & mask);
    raw.to_be_bytes()
}

pub fn with_sector_blocks(csd: [u8; 16], blocks: u128) -> [u8; 16] {
    with_field(csd, 39, 7, blocks - 1)
}

pub fn with_write_protect(csd: [u8; 16]) -> [u8; 16] {
    with_field(csd, 12, 1, 1)
}

pub fn with_command_classes(csd: [u8; 16], classes: u128) -> [u8; 16] {
    with_field(csd, 84, 12, classes)
}

pub fn with_tran_speed(csd: [u8; 16], tran_speed: u128) -> [u8; 16] {
    with_field(csd, 96, 8, tran_speed)
}

pub fn crc7(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in data {
        for bit in (0..8).rev() {
            let feedback = ((byte >> bit) & 1) ^ ((crc >> 6) & 1);
            crc = (crc << 1) & 0x7F;
            if feedback == 1 {
                crc ^= 0x09;
            }
        }
    }
    crc
}

pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Driver over `sim` with the test ceilings and a 50 MHz bus.
pub fn driver(sim: &mut SimCard) -> sdspi::SdSpi<'_, SimCard, TestConfig> {
    sdspi::SdSpi::new(sim, 50_000_000)
}

/// Initialized driver over `sim`.
pub fn ready(sim: &mut SimCard) -> sdspi::SdSpi<'_, SimCard, TestConfig> {
    let mut sd = driver(sim);
    sd.init().expect("card should initialize");
    sd
}
