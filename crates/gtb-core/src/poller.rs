//! The long-polling ingestion loop.
//!
//! Owns the offset cursor. Single logical thread of control: fetch, then
//! dispatch updates strictly in batch order, then send the replies.
//! Nothing here is concurrent on purpose: the dialogue store has exactly
//! one writer.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    dispatch::{Dispatcher, Outbound},
    messaging::{port::BotTransport, types::Update},
    Result,
};

pub struct Poller {
    transport: Arc<dyn BotTransport>,
    dispatcher: Dispatcher,
    poll_timeout: Duration,
    retry_delay: Duration,
    offset: i64,
}

impl Poller {
    pub fn new(
        transport: Arc<dyn BotTransport>,
        dispatcher: Dispatcher,
        poll_timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            poll_timeout,
            retry_delay,
            offset: 0,
        }
    }

    /// Resume from a known offset instead of 0.
    ///
    /// The cursor is never persisted here, so a restart re-fetches whatever
    /// the upstream still retains (at-least-once delivery); this is the
    /// seam for callers that do persist it.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Run until `shutdown` fires.
    ///
    /// A failed fetch is retried at the same offset after a delay; nothing
    /// on this path crashes the loop.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!("poller started at offset {}", self.offset);
        loop {
            let batch = tokio::select! {
                // Biased so a pending shutdown always wins over another fetch.
                biased;
                _ = shutdown.cancelled() => {
                    info!("poller stopping");
                    return Ok(());
                }
                fetched = self.transport.fetch_updates(self.offset, self.poll_timeout) => {
                    match fetched {
                        Ok(batch) => batch,
                        Err(err) => {
                            warn!("fetch failed at offset {}: {err}", self.offset);
                            tokio::time::sleep(self.retry_delay).await;
                            continue;
                        }
                    }
                }
            };

            self.process_batch(batch).await;
        }
    }

    /// The offset is advanced BEFORE a message is processed: a poison
    /// message can be lost on a crash, but it can never wedge the loop
    /// into refetching itself forever.
    async fn process_batch(&mut self, batch: Vec<Update>) {
        for update in batch {
            self.offset = update.update_id + 1;
            let Some(message) = update.message else {
                continue;
            };

            // Storage hiccups get one retry, then the update is dropped.
            let replies = match self.dispatcher.dispatch(&message).await {
                Ok(replies) => replies,
                Err(first) => match self.dispatcher.dispatch(&message).await {
                    Ok(replies) => {
                        warn!("dispatch recovered after retry: {first}");
                        replies
                    }
                    Err(err) => {
                        warn!("dropping update after failed retry: {err}");
                        continue;
                    }
                },
            };

            self.send_all(replies).await;
        }
    }

    /// A send failure is not fatal: the user misses one reply and the loop
    /// moves on.
    async fn send_all(&self, replies: Vec<Outbound>) {
        for reply in replies {
            if let Err(err) = self.transport.send_text(reply.chat_id, &reply.text).await {
                warn!(chat_id = reply.chat_id.0, "send failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        domain::{
            AccountId, BoardId, BoardRole, CategoryId, ChatId, ChatIdentity, Goal, GoalCategory,
            GoalId,
        },
        messaging::types::{Chat, Message},
        ports::GoalStore,
        Error,
    };

    enum Step {
        Batch(Vec<Update>),
        Fail(&'static str),
    }

    /// Transport that replays a script of fetch outcomes, records the
    /// offset of every fetch, and cancels the loop when the script runs dry.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Step>>,
        fetch_offsets: Mutex<Vec<i64>>,
        sent: Mutex<Vec<(ChatId, String)>>,
        fail_sends: bool,
        done: CancellationToken,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Step>, done: CancellationToken) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fetch_offsets: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                fail_sends: false,
                done,
            }
        }
    }

    #[async_trait]
    impl BotTransport for ScriptedTransport {
        async fn fetch_updates(&self, offset: i64, _timeout: Duration) -> Result<Vec<Update>> {
            self.fetch_offsets.lock().unwrap().push(offset);
            match self.script.lock().unwrap().pop_front() {
                Some(Step::Batch(batch)) => Ok(batch),
                Some(Step::Fail(reason)) => Err(Error::Transport(reason.to_string())),
                None => {
                    self.done.cancel();
                    Ok(Vec::new())
                }
            }
        }

        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<Message> {
            if self.fail_sends {
                return Err(Error::Transport("send refused".to_string()));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(reply_message(chat_id, text))
        }
    }

    /// Store whose only job is to count how many messages were dispatched;
    /// every chat looks unverified.
    #[derive(Default)]
    struct CountingStore {
        dispatched: Mutex<u32>,
    }

    #[async_trait]
    impl GoalStore for CountingStore {
        async fn get_or_create_chat(
            &self,
            chat_id: ChatId,
            tg_user_id: Option<i64>,
            username: Option<&str>,
        ) -> Result<ChatIdentity> {
            *self.dispatched.lock().unwrap() += 1;
            Ok(ChatIdentity {
                chat_id,
                account: None,
                tg_user_id,
                username: username.map(str::to_string),
                verification_code: None,
            })
        }

        async fn set_verification_code(&self, _chat_id: ChatId, _code: &str) -> Result<()> {
            Ok(())
        }

        async fn link_account(
            &self,
            _code: &str,
            _account: AccountId,
        ) -> Result<Option<ChatIdentity>> {
            Ok(None)
        }

        async fn goals_for_account(&self, _account: AccountId) -> Result<Vec<Goal>> {
            Ok(Vec::new())
        }

        async fn categories_for_account(&self, _account: AccountId) -> Result<Vec<GoalCategory>> {
            Ok(Vec::new())
        }

        async fn category_for_account(
            &self,
            _account: AccountId,
            _category: CategoryId,
        ) -> Result<Option<GoalCategory>> {
            Ok(None)
        }

        async fn board_role(
            &self,
            _account: AccountId,
            _board: BoardId,
        ) -> Result<Option<BoardRole>> {
            Ok(None)
        }

        async fn create_goal(
            &self,
            _account: AccountId,
            category: CategoryId,
            title: &str,
        ) -> Result<Goal> {
            Ok(Goal {
                id: GoalId(1),
                category,
                title: title.to_string(),
            })
        }
    }

    fn reply_message(chat_id: ChatId, text: &str) -> Message {
        Message {
            message_id: 1,
            date: 0,
            text: Some(text.to_string()),
            from: None,
            chat: Chat {
                id: chat_id,
                first_name: None,
                username: None,
                kind: "private".to_string(),
            },
        }
    }

    fn update(id: i64, with_message: bool) -> Update {
        Update {
            update_id: id,
            message: with_message.then(|| reply_message(ChatId(11), "hi")),
        }
    }

    async fn run_scripted(transport: Arc<ScriptedTransport>, done: CancellationToken) -> Poller {
        let dispatcher = Dispatcher::new(Arc::new(CountingStore::default()));
        let mut poller = Poller::new(
            transport,
            dispatcher,
            Duration::from_millis(10),
            Duration::from_millis(5),
        );
        poller.run(done).await.unwrap();
        poller
    }

    #[tokio::test]
    async fn offset_follows_max_update_id_plus_one_and_survives_empty_batches() {
        let done = CancellationToken::new();
        let transport = Arc::new(ScriptedTransport::new(
            vec![
                Step::Batch(vec![update(1, true), update(2, true)]),
                Step::Batch(vec![]),
                Step::Batch(vec![update(7, true)]),
            ],
            done.clone(),
        ));

        let poller = run_scripted(transport.clone(), done).await;

        assert_eq!(*transport.fetch_offsets.lock().unwrap(), vec![0, 3, 3, 8]);
        assert_eq!(poller.offset(), 8);
    }

    #[tokio::test]
    async fn failed_fetch_is_retried_at_the_same_offset() {
        let done = CancellationToken::new();
        let transport = Arc::new(ScriptedTransport::new(
            vec![
                Step::Batch(vec![update(1, true)]),
                Step::Fail("connection reset"),
                Step::Fail("connection reset"),
            ],
            done.clone(),
        ));

        run_scripted(transport.clone(), done).await;

        assert_eq!(*transport.fetch_offsets.lock().unwrap(), vec![0, 2, 2, 2]);
    }

    #[tokio::test]
    async fn update_without_message_is_acknowledged_but_not_dispatched() {
        let done = CancellationToken::new();
        let transport = Arc::new(ScriptedTransport::new(
            vec![Step::Batch(vec![update(5, false)])],
            done.clone(),
        ));

        let store = Arc::new(CountingStore::default());
        let mut poller = Poller::new(
            transport.clone(),
            Dispatcher::new(store.clone()),
            Duration::from_millis(10),
            Duration::from_millis(5),
        );
        poller.run(done).await.unwrap();

        assert_eq!(*store.dispatched.lock().unwrap(), 0);
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(poller.offset(), 6);
    }

    #[tokio::test]
    async fn send_failures_do_not_stop_the_loop() {
        let done = CancellationToken::new();
        let mut transport = ScriptedTransport::new(
            vec![Step::Batch(vec![update(1, true), update(2, true)])],
            done.clone(),
        );
        transport.fail_sends = true;
        let transport = Arc::new(transport);

        let store = Arc::new(CountingStore::default());
        let mut poller = Poller::new(
            transport.clone(),
            Dispatcher::new(store.clone()),
            Duration::from_millis(10),
            Duration::from_millis(5),
        );
        poller.run(done).await.unwrap();

        // Both updates were dispatched even though every reply failed.
        assert_eq!(*store.dispatched.lock().unwrap(), 2);
        assert_eq!(poller.offset(), 3);
    }
}
