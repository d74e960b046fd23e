use async_trait::async_trait;

use crate::{
    domain::{
        AccountId, BoardId, BoardRole, CategoryId, ChatId, ChatIdentity, Goal, GoalCategory,
    },
    Result,
};

/// Persistence port for chat identities and goal data.
///
/// The backing store is shared with the web application; the bot only needs
/// this narrow slice of it.
#[async_trait]
pub trait GoalStore: Send + Sync {
    /// Resolve the identity row for a chat, creating it on first contact.
    /// Idempotent and race-tolerant: two concurrent calls for the same chat
    /// id must yield the same single row.
    async fn get_or_create_chat(
        &self,
        chat_id: ChatId,
        tg_user_id: Option<i64>,
        username: Option<&str>,
    ) -> Result<ChatIdentity>;

    /// Overwrite the chat's verification code, invalidating any prior one.
    async fn set_verification_code(&self, chat_id: ChatId, code: &str) -> Result<()>;

    /// The external verification step: link the chat holding `code` to an
    /// account. Links at most once: unknown codes and already-verified
    /// chats yield `None`. The dispatcher never calls this; the web
    /// application does.
    async fn link_account(&self, code: &str, account: AccountId) -> Result<Option<ChatIdentity>>;

    /// Non-deleted goals on boards the account participates in, ascending id.
    async fn goals_for_account(&self, account: AccountId) -> Result<Vec<Goal>>;

    /// Non-deleted categories on boards the account participates in,
    /// ascending id.
    async fn categories_for_account(&self, account: AccountId) -> Result<Vec<GoalCategory>>;

    /// Single-category lookup with the same visibility rules as
    /// `categories_for_account`; a deleted or foreign id is a miss, not an
    /// error.
    async fn category_for_account(
        &self,
        account: AccountId,
        category: CategoryId,
    ) -> Result<Option<GoalCategory>>;

    /// The account's role on a board, if it participates at all.
    async fn board_role(&self, account: AccountId, board: BoardId) -> Result<Option<BoardRole>>;

    /// Create a goal owned by `account` under `category`.
    async fn create_goal(
        &self,
        account: AccountId,
        category: CategoryId,
        title: &str,
    ) -> Result<Goal>;
}
