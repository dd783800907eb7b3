/// Complement of every byte value; anything outside `ACGTU` (either case)
/// maps to `N`.
const COMPLEMENT: [u8; 256] = {
    let mut table = [b'N'; 256];
    let pairs = [(b'A', b'T'), (b'C', b'G'), (b'G', b'C'), (b'T', b'A'), (b'U', b'A')];
    let mut i = 0;
    while i < pairs.len() {
        let (base, comp) = pairs[i];
        table[base as usize] = comp;
        table[base.to_ascii_lowercase() as usize] = comp;
        i += 1;
    }
    table
};

/// Reverse complement of `seq`, uppercased.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| COMPLEMENT[b as usize]).collect()
}
