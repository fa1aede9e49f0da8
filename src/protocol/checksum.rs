/// Frame checksum: the wrapping byte sum of the unescaped frame body.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}
