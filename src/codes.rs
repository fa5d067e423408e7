use rand::Rng;

/// Alphabet for join/access codes. Ambiguous glyphs (0/O, 1/l, 5/s, rn/m)
/// are left out because teams read these codes to each other out loud.
const CODE_CHARS: &[u8] = b"2346789abcdefghijkmnpqrtuvwxyz";

pub const CODE_LEN: usize = 8;

pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_use_the_restricted_alphabet() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.bytes().all(|b| CODE_CHARS.contains(&b)), "{code}");
        }
    }

    #[test]
    fn codes_are_not_constant() {
        let a = generate_code();
        let b = generate_code();
        let c = generate_code();
        assert!(a != b || b != c);
    }
}
