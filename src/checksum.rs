/// Calcula o checksum da Internet (RFC 1071) sobre `data`.
///
/// Os bytes são somados em pares big-endian, então o resultado não depende
/// da ordem de bytes do host. Um byte final isolado entra como byte alto de
/// uma palavra completada com zero. O valor devolvido já está em ordem de
/// rede quando escrito com `to_be_bytes`.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    if let [last] = words.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }
    // Dobra os carries até caber em 16 bits
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
