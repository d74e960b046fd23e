//! The per-chat state machine.
//!
//! Two levels: persisted verification state gates the in-memory dialogue
//! state. A chat with no linked account only ever receives fresh
//! verification codes; a verified chat gets command routing plus the
//! goal-creation dialogue.
//!
//! Handlers return the replies to send instead of sending them, so the
//! whole machine runs against a mock store with no transport at all. Only
//! storage failures escape as `Err`; every domain failure (unknown
//! category, missing permission) terminates in a reply.

use std::sync::Arc;

use tracing::debug;

use crate::{
    dialogue::{DialogueStep, DialogueStore},
    domain::{
        generate_verification_code, AccountId, CategoryId, ChatId, ChatIdentity, GoalCategory,
    },
    messaging::types::Message,
    ports::GoalStore,
    Result,
};

/// A reply queued for the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub chat_id: ChatId,
    pub text: String,
}

impl Outbound {
    fn new(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn GoalStore>,
    dialogues: DialogueStore,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn GoalStore>) -> Self {
        Self {
            store,
            dialogues: DialogueStore::default(),
        }
    }

    /// Route one inbound message.
    pub async fn dispatch(&mut self, message: &Message) -> Result<Vec<Outbound>> {
        let sender = message.from.as_ref();
        let identity = self
            .store
            .get_or_create_chat(
                message.chat.id,
                sender.map(|s| s.id),
                sender.and_then(|s| s.username.as_deref()),
            )
            .await?;

        match identity.account {
            Some(account) => self.handle_verified(account, message).await,
            None => self.handle_unverified(&identity).await,
        }
    }

    /// Any message from an unverified chat earns a fresh code; the previous
    /// one stops working the moment the column is overwritten. Command text
    /// is ignored entirely on this path.
    async fn handle_unverified(&mut self, identity: &ChatIdentity) -> Result<Vec<Outbound>> {
        let code = generate_verification_code();
        self.store
            .set_verification_code(identity.chat_id, &code)
            .await?;
        Ok(vec![
            Outbound::new(identity.chat_id, "Hello"),
            Outbound::new(identity.chat_id, format!("You verification code: {code}")),
        ])
    }

    async fn handle_verified(
        &mut self,
        account: AccountId,
        message: &Message,
    ) -> Result<Vec<Outbound>> {
        let chat_id = message.chat.id;
        let text = message.text.as_deref().unwrap_or("");

        if let Some(command) = parse_command(text) {
            return self.handle_command(account, chat_id, &command).await;
        }

        match self.dialogues.get(chat_id).cloned() {
            Some(DialogueStep::AwaitingCategory) => {
                self.select_category(account, chat_id, text).await
            }
            Some(DialogueStep::AwaitingTitle { category }) => {
                self.create_goal(account, chat_id, category, text).await
            }
            // Plain text with no dialogue in flight is dropped.
            None => {
                debug!(chat_id = chat_id.0, "ignoring text outside any dialogue");
                Ok(Vec::new())
            }
        }
    }

    async fn handle_command(
        &mut self,
        account: AccountId,
        chat_id: ChatId,
        command: &str,
    ) -> Result<Vec<Outbound>> {
        match command {
            "goals" => self.list_goals(account, chat_id).await,
            "create" => self.begin_create(account, chat_id).await,
            "cancel" => {
                self.dialogues.clear(chat_id);
                Ok(vec![Outbound::new(chat_id, "Canceled")])
            }
            _ => Ok(vec![Outbound::new(chat_id, "Command not found")]),
        }
    }

    async fn list_goals(&self, account: AccountId, chat_id: ChatId) -> Result<Vec<Outbound>> {
        let goals = self.store.goals_for_account(account).await?;
        let text = if goals.is_empty() {
            "You have not goals".to_string()
        } else {
            let lines: Vec<String> = goals
                .iter()
                .map(|goal| format!("{}) {}", goal.id.0, goal.title))
                .collect();
            format!("Your goals:\n{}", lines.join("\n"))
        };
        Ok(vec![Outbound::new(chat_id, text)])
    }

    async fn begin_create(&mut self, account: AccountId, chat_id: ChatId) -> Result<Vec<Outbound>> {
        let categories = self.store.categories_for_account(account).await?;
        if categories.is_empty() {
            return Ok(vec![Outbound::new(chat_id, "You have not category")]);
        }

        let lines: Vec<String> = categories
            .iter()
            .map(|category| format!("{}) {}", category.id.0, category.title))
            .collect();
        self.dialogues.set(chat_id, DialogueStep::AwaitingCategory);
        Ok(vec![Outbound::new(
            chat_id,
            format!("Select category to create goal:\n{}", lines.join("\n")),
        )])
    }

    /// `AwaitingCategory` step. Every failure leaves the step installed so
    /// the user can answer again or `/cancel`.
    async fn select_category(
        &mut self,
        account: AccountId,
        chat_id: ChatId,
        text: &str,
    ) -> Result<Vec<Outbound>> {
        let category = match text.trim().parse::<i64>() {
            Ok(raw) => {
                self.store
                    .category_for_account(account, CategoryId(raw))
                    .await?
            }
            Err(_) => None,
        };
        let Some(category) = category else {
            return Ok(vec![Outbound::new(chat_id, "Category not found")]);
        };

        let role = self.store.board_role(account, category.board).await?;
        if !role.is_some_and(|role| role.can_create_goals()) {
            return Ok(vec![Outbound::new(
                chat_id,
                "You cannot create a goal in the selected category.",
            )]);
        }

        self.dialogues
            .set(chat_id, DialogueStep::AwaitingTitle { category });
        Ok(vec![Outbound::new(chat_id, "Set goal title")])
    }

    /// `AwaitingTitle` step: terminal on success.
    async fn create_goal(
        &mut self,
        account: AccountId,
        chat_id: ChatId,
        category: GoalCategory,
        text: &str,
    ) -> Result<Vec<Outbound>> {
        let title = text.trim();
        if title.is_empty() {
            // A sticker or a blank line is not a title; ask again.
            return Ok(vec![Outbound::new(chat_id, "Set goal title")]);
        }

        self.store.create_goal(account, category.id, title).await?;
        self.dialogues.clear(chat_id);
        Ok(vec![Outbound::new(chat_id, "New goal created")])
    }
}

/// Extract a command name from `/name@botname args`, lowercased.
///
/// Returns `None` for anything that does not start with the command prefix;
/// a bare `/` yields an empty name, which routes to "command not found".
fn parse_command(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('/') {
        return None;
    }
    let first = trimmed.split_whitespace().next().unwrap_or(trimmed);
    let name = first.trim_start_matches('/').split('@').next().unwrap_or("");
    Some(name.to_lowercase())
}
