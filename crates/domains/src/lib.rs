//! forum/crates/domains/src/lib.rs
//!
//! Entities, the error taxonomy, and the port traits every adapter implements.
//! Nothing in this crate performs I/O.

pub mod errors;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use chrono::Utc;

    #[test]
    fn test_board_liveness_follows_deleted_at() {
        let mut board = Board {
            id: 1,
            name: "rust".to_string(),
            description: None,
            created_at: Utc::now(),
            deleted_at: None,
        };
        assert!(board.is_live());

        board.deleted_at = Some(Utc::now());
        assert!(!board.is_live());
    }

    #[test]
    fn test_page_defaults_match_listing_contract() {
        assert_eq!(Page::posts().limit, 100);
        assert_eq!(Page::comments().limit, 500);
        assert_eq!(Page::posts().offset, 0);
        assert!(!Page::posts().include_deleted);
    }
}
