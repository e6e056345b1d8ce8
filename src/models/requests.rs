use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to add a card to the current user's have or want list
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddCardRequest {
    #[validate(length(min = 1, max = 128))]
    #[serde(alias = "card_id", rename = "cardId")]
    pub card_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_card_id_rejected() {
        let req = AddCardRequest { card_id: String::new() };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_accepts_both_spellings() {
        let camel: AddCardRequest = serde_json::from_str(r#"{"cardId":"A1-001"}"#).unwrap();
        let snake: AddCardRequest = serde_json::from_str(r#"{"card_id":"A1-001"}"#).unwrap();
        assert_eq!(camel.card_id, snake.card_id);
        assert!(camel.validate().is_ok());
    }
}
