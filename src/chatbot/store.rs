use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use super::{Chatbot, ChatbotPatch, NewChatbot, Role, StoredMessage, DEFAULT_SYSTEM_PROMPT};
use crate::db::DbPool;

const CHATBOT_COLUMNS: &str = "id, user_id, name, description, system_prompt, metadata, \
     allowed_domains, is_embeddable, embed_key, created_at, updated_at";

/// SQLite-backed chatbot repository.
#[derive(Clone)]
pub struct ChatbotStore {
    db: Arc<DbPool>,
}

impl ChatbotStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub fn create(&self, user_id: &str, input: NewChatbot) -> anyhow::Result<Chatbot> {
        let now = chrono::Utc::now().to_rfc3339();
        let chatbot = Chatbot {
            id: new_chatbot_id(),
            user_id: user_id.to_string(),
            name: input.name,
            description: input.description,
            system_prompt: input
                .system_prompt
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            metadata: input.metadata,
            allowed_domains: input.allowed_domains,
            is_embeddable: input.is_embeddable,
            embed_key: uuid::Uuid::new_v4().simple().to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        let metadata = chatbot.metadata.as_ref().map(Value::to_string);
        let domains = serde_json::to_string(&chatbot.allowed_domains)?;
        self.db.write(|conn| {
            conn.execute(
                "INSERT INTO chatbots (id, user_id, name, description, system_prompt, metadata,
                     allowed_domains, is_embeddable, embed_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    chatbot.id,
                    chatbot.user_id,
                    chatbot.name,
                    chatbot.description,
                    chatbot.system_prompt,
                    metadata,
                    domains,
                    chatbot.is_embeddable,
                    chatbot.embed_key,
                    chatbot.created_at,
                    chatbot.updated_at,
                ],
            )?;
            Ok(())
        })?;

        tracing::info!(chatbot_id = %chatbot.id, user_id, "chatbot created");
        Ok(chatbot)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<Chatbot>> {
        self.db.read(|conn| select_by(conn, "id", id))
    }

    pub fn get_by_embed_key(&self, embed_key: &str) -> anyhow::Result<Option<Chatbot>> {
        self.db.read(|conn| select_by(conn, "embed_key", embed_key))
    }

    /// Fetch a chatbot only if `user_id` owns it.
    pub fn get_owned(&self, id: &str, user_id: &str) -> anyhow::Result<Option<Chatbot>> {
        Ok(self.get(id)?.filter(|c| c.user_id == user_id))
    }

    /// One page of the caller's chatbots, newest first, plus the total count.
    pub fn list_for_user(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<(Vec<Chatbot>, u64)> {
        let limit = i64::from(limit.max(1));
        let offset = i64::from(page.max(1) - 1) * limit;
        self.db.read(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chatbots WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {CHATBOT_COLUMNS} FROM chatbots
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, limit, offset], chatbot_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((rows, total.max(0) as u64))
        })
    }

    pub fn update(&self, id: &str, patch: ChatbotPatch) -> anyhow::Result<Option<Chatbot>> {
        self.modify(id, |chatbot| {
            if let Some(name) = patch.name {
                chatbot.name = name;
            }
            if let Some(description) = patch.description {
                chatbot.description = description;
            }
            if let Some(prompt) = patch.system_prompt {
                chatbot.system_prompt = prompt;
            }
            if let Some(metadata) = patch.metadata {
                chatbot.metadata = Some(metadata);
            }
            if let Some(domains) = patch.allowed_domains {
                chatbot.allowed_domains = domains;
            }
            if let Some(embeddable) = patch.is_embeddable {
                chatbot.is_embeddable = embeddable;
            }
            true
        })
    }

    pub fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let deleted = self
            .db
            .write(|conn| Ok(conn.execute("DELETE FROM chatbots WHERE id = ?1", [id])?))?;
        if deleted > 0 {
            tracing::info!(chatbot_id = id, "chatbot deleted");
        }
        Ok(deleted > 0)
    }

    /// Append a pattern to the whitelist unless an identical entry exists.
    pub fn add_domain(&self, id: &str, domain: &str) -> anyhow::Result<Option<Chatbot>> {
        self.modify(id, |chatbot| {
            if chatbot.allowed_domains.iter().any(|d| d == domain) {
                return false;
            }
            chatbot.allowed_domains.push(domain.to_string());
            true
        })
    }

    /// Drop every whitelist entry equal to `domain`.
    pub fn remove_domain(&self, id: &str, domain: &str) -> anyhow::Result<Option<Chatbot>> {
        self.modify(id, |chatbot| {
            let before = chatbot.allowed_domains.len();
            chatbot.allowed_domains.retain(|d| d != domain);
            chatbot.allowed_domains.len() != before
        })
    }

    /// Append messages in order and bump the chatbot's `updated_at`.
    pub fn append_messages(&self, id: &str, messages: &[StoredMessage]) -> anyhow::Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.db.transaction(|tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO chat_messages (chatbot_id, role, content, metadata, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for m in messages {
                stmt.execute(params![
                    id,
                    m.role.as_str(),
                    m.content,
                    m.metadata.as_ref().map(Value::to_string),
                    m.timestamp,
                ])?;
            }
            tx.execute("UPDATE chatbots SET updated_at = ?1 WHERE id = ?2", params![now, id])?;
            Ok(())
        })
    }

    pub fn history(&self, id: &str) -> anyhow::Result<Vec<StoredMessage>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content, metadata, timestamp FROM chat_messages
                 WHERE chatbot_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([id], |row| {
                    let role: String = row.get(0)?;
                    let metadata: Option<String> = row.get(2)?;
                    Ok(StoredMessage {
                        role: Role::parse(&role).unwrap_or(Role::User),
                        content: row.get(1)?,
                        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                        timestamp: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Remove all messages; returns how many were deleted.
    pub fn clear_history(&self, id: &str) -> anyhow::Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        self.db.transaction(|tx| {
            let removed = tx.execute("DELETE FROM chat_messages WHERE chatbot_id = ?1", [id])?;
            tx.execute("UPDATE chatbots SET updated_at = ?1 WHERE id = ?2", params![now, id])?;
            Ok(removed)
        })
    }

    /// Load, change and store one chatbot under a single write transaction so
    /// concurrent edits of the same row cannot overwrite each other. `change`
    /// reports whether it altered anything; untouched rows are not rewritten.
    fn modify<F>(&self, id: &str, change: F) -> anyhow::Result<Option<Chatbot>>
    where
        F: FnOnce(&mut Chatbot) -> bool,
    {
        self.db.transaction(|tx| {
            let Some(mut chatbot) = select_by(tx, "id", id)? else {
                return Ok(None);
            };
            if change(&mut chatbot) {
                chatbot.updated_at = chrono::Utc::now().to_rfc3339();
                write_row(tx, &chatbot)?;
            }
            Ok(Some(chatbot))
        })
    }
}

fn select_by(conn: &Connection, column: &str, value: &str) -> anyhow::Result<Option<Chatbot>> {
    let sql = format!("SELECT {CHATBOT_COLUMNS} FROM chatbots WHERE {column} = ?1");
    Ok(conn.query_row(&sql, [value], chatbot_from_row).optional()?)
}

fn write_row(conn: &Connection, chatbot: &Chatbot) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE chatbots
         SET name = ?1, description = ?2, system_prompt = ?3, metadata = ?4,
             allowed_domains = ?5, is_embeddable = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            chatbot.name,
            chatbot.description,
            chatbot.system_prompt,
            chatbot.metadata.as_ref().map(Value::to_string),
            serde_json::to_string(&chatbot.allowed_domains)?,
            chatbot.is_embeddable,
            chatbot.updated_at,
            chatbot.id,
        ],
    )?;
    Ok(())
}

/// 24 lowercase hex characters.
fn new_chatbot_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(24);
    id
}

fn chatbot_from_row(row: &Row<'_>) -> rusqlite::Result<Chatbot> {
    let metadata: Option<String> = row.get(5)?;
    let domains: String = row.get(6)?;
    Ok(Chatbot {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        system_prompt: row.get(4)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        allowed_domains: serde_json::from_str(&domains).unwrap_or_default(),
        is_embeddable: row.get(7)?,
        embed_key: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn store() -> (tempfile::TempDir, ChatbotStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::open(dir.path().join("store.db"), 2).unwrap();
        (dir, ChatbotStore::new(Arc::new(pool)))
    }

    /// Run `f(i)` on `n` threads released together.
    fn race<F>(n: usize, f: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let barrier = Arc::new(Barrier::new(n));
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let (f, barrier) = (f.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    f(i);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    fn sample(name: &str) -> NewChatbot {
        NewChatbot {
            name: name.into(),
            description: "Answers questions".into(),
            ..Default::default()
        }
    }

    #[test]
    fn create_assigns_hex_id_and_default_prompt() {
        let (_dir, store) = store();
        let bot = store.create("user-1", sample("Support")).unwrap();
        assert_eq!(bot.id.len(), 24);
        assert!(bot.id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(bot.embed_key.len(), 32);
        assert_eq!(bot.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(!bot.is_embeddable);

        let loaded = store.get(&bot.id).unwrap().unwrap();
        assert_eq!(loaded, bot);
        let by_key = store.get_by_embed_key(&bot.embed_key).unwrap().unwrap();
        assert_eq!(by_key.id, bot.id);
    }

    #[test]
    fn get_owned_hides_other_users_chatbots() {
        let (_dir, store) = store();
        let bot = store.create("alice", sample("A")).unwrap();
        assert!(store.get_owned(&bot.id, "alice").unwrap().is_some());
        assert!(store.get_owned(&bot.id, "bob").unwrap().is_none());
    }

    #[test]
    fn list_paginates_per_user() {
        let (_dir, store) = store();
        for i in 0..5 {
            store.create("alice", sample(&format!("bot-{i}"))).unwrap();
        }
        store.create("bob", sample("other")).unwrap();

        let (page1, total) = store.list_for_user("alice", 1, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page1.len(), 2);
        let (page3, _) = store.list_for_user("alice", 3, 2).unwrap();
        assert_eq!(page3.len(), 1);
        assert!(page1.iter().all(|b| b.user_id == "alice"));
    }

    #[test]
    fn update_applies_only_present_fields() {
        let (_dir, store) = store();
        let bot = store.create("alice", sample("Old")).unwrap();
        let patch = ChatbotPatch {
            name: Some("New".into()),
            is_embeddable: Some(true),
            ..Default::default()
        };
        let updated = store.update(&bot.id, patch).unwrap().unwrap();
        assert_eq!(updated.name, "New");
        assert_eq!(updated.description, bot.description);
        assert!(updated.is_embeddable);
        assert!(store.update("0".repeat(24).as_str(), ChatbotPatch::default()).unwrap().is_none());
    }

    #[test]
    fn domains_add_once_and_remove() {
        let (_dir, store) = store();
        let bot = store.create("alice", sample("A")).unwrap();
        store.add_domain(&bot.id, "example.com").unwrap();
        let bot2 = store.add_domain(&bot.id, "example.com").unwrap().unwrap();
        assert_eq!(bot2.allowed_domains, vec!["example.com"]);

        store.add_domain(&bot.id, "*.foo.org").unwrap();
        let bot3 = store.remove_domain(&bot.id, "example.com").unwrap().unwrap();
        assert_eq!(bot3.allowed_domains, vec!["*.foo.org"]);
        assert_eq!(store.get(&bot.id).unwrap().unwrap().allowed_domains, vec!["*.foo.org"]);
        assert!(store.add_domain(&"0".repeat(24), "x.com").unwrap().is_none());
    }

    #[test]
    fn concurrent_domain_adds_are_all_kept() {
        let (_dir, store) = store();
        let id = store.create("alice", sample("A")).unwrap().id;
        let (s, bot) = (store.clone(), id.clone());
        race(64, move |i| {
            s.add_domain(&bot, &format!("d{i}.example.com")).unwrap();
        });
        let mut domains = store.get(&id).unwrap().unwrap().allowed_domains;
        domains.sort();
        domains.dedup();
        assert_eq!(domains.len(), 64);
    }

    #[test]
    fn concurrent_update_does_not_restore_removed_domains() {
        let (_dir, store) = store();
        let input = NewChatbot {
            allowed_domains: (0..16).map(|i| format!("d{i}.example.com")).collect(),
            ..sample("A")
        };
        let id = store.create("alice", input).unwrap().id;
        let (s, bot) = (store.clone(), id.clone());
        race(32, move |i| {
            if i % 2 == 0 {
                s.remove_domain(&bot, &format!("d{}.example.com", i / 2)).unwrap();
            } else {
                let patch = ChatbotPatch {
                    name: Some(format!("renamed-{i}")),
                    ..Default::default()
                };
                s.update(&bot, patch).unwrap();
            }
        });
        let bot = store.get(&id).unwrap().unwrap();
        assert!(bot.allowed_domains.is_empty(), "left over: {:?}", bot.allowed_domains);
        assert!(bot.name.starts_with("renamed-"));
    }

    #[test]
    fn history_round_trip_and_clear() {
        let (_dir, store) = store();
        let bot = store.create("alice", sample("A")).unwrap();
        store
            .append_messages(
                &bot.id,
                &[
                    StoredMessage::new(Role::User, "hi"),
                    StoredMessage::new(Role::Assistant, "hello")
                        .with_metadata(serde_json::json!({"hasContext": false})),
                ],
            )
            .unwrap();

        let history = store.history(&bot.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].metadata.as_ref().unwrap()["hasContext"], false);

        assert_eq!(store.clear_history(&bot.id).unwrap(), 2);
        assert!(store.history(&bot.id).unwrap().is_empty());
    }

    #[test]
    fn delete_cascades_messages() {
        let (_dir, store) = store();
        let bot = store.create("alice", sample("A")).unwrap();
        store
            .append_messages(&bot.id, &[StoredMessage::new(Role::User, "hi")])
            .unwrap();
        assert!(store.delete(&bot.id).unwrap());
        assert!(!store.delete(&bot.id).unwrap());
        assert!(store.history(&bot.id).unwrap().is_empty());
    }
}
