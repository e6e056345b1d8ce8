// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    CandidateCollections, Card, CardId, CardSummary, CollectionEntry, ListEntry, ListKind, ListedCard,
    MatchResult, MatchedCard, Rarity, RarityGroup, TradeMatches, TraderProfile, UserCollections, UserId,
};
pub use requests::AddCardRequest;
pub use responses::{
    AddCardResponse, CollectionResponse, EmptyState, ErrorResponse, HealthResponse, MatchView,
    RemoveCardResponse, TradeMatchesResponse,
};
