//! 随机码生成：登录码、引用码、令牌键。

use data_encoding::HEXLOWER;
use rand::Rng;

/// 大写字母 + 数字。
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 从字母表生成定长随机码。
pub fn random_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// 不透明认证令牌键：20 个随机字节的十六进制编码。
pub fn random_token_key() -> String {
    let mut bytes = [0u8; 20];
    rand::rng().fill(&mut bytes);
    HEXLOWER.encode(&bytes)
}
