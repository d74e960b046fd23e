use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;

/// Telegram chat id (numeric, assigned upstream); the natural key for
/// everything per-chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Application account id (the web application's user).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccountId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoardId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CategoryId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GoalId(pub i64);

/// Role of an account on a board. Numbering is shared with the web
/// application's database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoardRole {
    Owner = 1,
    Writer = 2,
    Reader = 3,
}

impl BoardRole {
    pub fn from_i64(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(Self::Owner),
            2 => Some(Self::Writer),
            3 => Some(Self::Reader),
            _ => None,
        }
    }

    /// Readers browse boards; only owners and writers create goals on them.
    pub fn can_create_goals(self) -> bool {
        matches!(self, Self::Owner | Self::Writer)
    }
}

/// Persisted identity of a Telegram chat, keyed by chat id.
///
/// `account` is linked exactly once by the web application's verification
/// step; the bot itself never promotes a chat.
#[derive(Clone, Debug)]
pub struct ChatIdentity {
    pub chat_id: ChatId,
    pub account: Option<AccountId>,
    pub tg_user_id: Option<i64>,
    pub username: Option<String>,
    pub verification_code: Option<String>,
}

impl ChatIdentity {
    pub fn is_verified(&self) -> bool {
        self.account.is_some()
    }
}

/// Category read model used by the dialogue. The storage adapter owns the
/// full column set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoalCategory {
    pub id: CategoryId,
    pub board: BoardId,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Goal {
    pub id: GoalId,
    pub category: CategoryId,
    pub title: String,
}

pub const VERIFICATION_CODE_LEN: usize = 20;

/// Generate a fresh verification code: 20 random alphanumeric characters.
///
/// At most one code is valid per chat because the persisted column is
/// overwritten on every issuance.
pub fn generate_verification_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFICATION_CODE_LEN)
        .map(char::from)
        .collect()
}
