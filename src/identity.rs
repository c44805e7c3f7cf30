//! アーティファクトID生成
//!
//! アップロードしたオブジェクトに割り当てるIDを生成する。
//! テストで決定的なIDを使えるように trait として抽象化している。

use crate::types::Identity;
use uuid::Uuid;

/// ファイルシステム安全なIDを生成する
///
/// UUID v4（OSの乱数源）をハイフン無しの32桁16進数で表現したもの。
///
/// # Examples
///
/// ```
/// # use fatawa_processor::identity::generate_id;
/// let id = generate_id();
/// assert_eq!(id.as_str().len(), 32);
/// assert!(!id.as_str().contains('-'));
/// ```
pub fn generate_id() -> Identity {
    Identity::from_raw(Uuid::new_v4().simple().to_string())
}

/// ID生成器
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Identity;
}

/// UUID v4 ベースのID生成器（本番用）
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> Identity {
        generate_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<Identity> = (0..10_000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_generated_ids_are_filesystem_safe() {
        let id_gen = UuidGenerator;
        for _ in 0..10_000 {
            let id = id_gen.generate();
            let s = id.as_str();
            assert_eq!(s.len(), 32);
            assert!(!s.contains('-'));
            assert!(!s.contains('/'));
            assert!(!s.contains('\\'));
            assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
