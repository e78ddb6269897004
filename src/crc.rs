/// CRC-7 nibble lookup table, polynomial `x^7 + x^3 + 1`.
const CRC7_TABLE: [u8; 16] = [
    0x00, 0x09, 0x12, 0x1B, 0x24, 0x2D, 0x36, 0x3F, 0x48, 0x41, 0x5A, 0x53, 0x6C, 0x65, 0x7E, 0x77,
];

/// CRC-7 calculation.
///
/// Returns the bare 7-bit value; command frames carry it as `crc << 1 | 1`.
pub fn crc7(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let index = ((crc >> 3) & 0x0F) ^ (byte >> 4);
        crc = ((crc << 4) ^ CRC7_TABLE[usize::from(index)]) & 0x7F;

        let index = ((crc >> 3) & 0x0F) ^ (byte & 0x0F);
        crc = ((crc << 4) ^ CRC7_TABLE[usize::from(index)]) & 0x7F;
    }
    crc
}

/// CRC-16 calculation.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0;
    for &byte in data {
        crc = ((crc >> 8) & 0xFF) | (crc << 8);
        crc ^= u16::from(byte);
        crc ^= (crc & 0xFF) >> 4;
        crc ^= crc << 12;
        crc ^= (crc & 0xFF) << 5;
    }
    crc
}
