/// Internet checksum (RFC 1071) over an ICMP message, skipping the checksum
/// field itself (the second 16-bit word).
pub(crate) fn calculate_checksum(message: &[u8]) -> u16 {
    pnet::util::checksum(message, 1)
}
