/// Represents config for [`SdSpi`](crate::SdSpi).
///
/// Every busy-poll in the driver is bounded by one of these ceilings.
pub trait SdSpiConfig {
    /// Max bytes polled while waiting for the card to leave busy state or
    /// for a data start token.
    const TRANSFER_RETRY_TIMES: usize;
    /// Max bytes polled for an R1 response after a command frame.
    const RESPONSE_ATTEMPTS: usize;
    /// Max GO_IDLE_STATE attempts.
    const GO_IDLE_ATTEMPTS: usize;
    /// Max SEND_IF_COND attempts.
    const IF_COND_ATTEMPTS: usize;
    /// Max SD_SEND_OP_COND polls.
    const OP_COND_ATTEMPTS: usize;
    /// Max SET_BLOCKLEN attempts.
    const SET_BLOCK_SIZE_ATTEMPTS: usize;
    /// Protect commands and data with CRC.
    const CRC_PROTECTION: bool;
}

/// Default implementation of [`SdSpiConfig`](crate::SdSpiConfig).
pub struct DefaultSdSpiConfig;

impl SdSpiConfig for DefaultSdSpiConfig {
    const TRANSFER_RETRY_TIMES: usize = 20_000;
    const RESPONSE_ATTEMPTS: usize = 9;
    const GO_IDLE_ATTEMPTS: usize = 20_000;
    const IF_COND_ATTEMPTS: usize = 20_000;
    const OP_COND_ATTEMPTS: usize = 20_000;
    const SET_BLOCK_SIZE_ATTEMPTS: usize = 20_000;
    const CRC_PROTECTION: bool = false;
}
