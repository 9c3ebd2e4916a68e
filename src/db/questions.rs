use super::Db;
use rusqlite::{Result, params};

/// Maximum number of autocomplete suggestions returned.
pub const MAX_SUGGESTIONS: usize = 5;

impl Db {
    /// Record a question. Returns `false` for blank or already-known questions.
    pub fn add_question(&self, question: &str) -> Result<bool> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(false);
        }
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO questions (question) VALUES (?)",
            params![question],
        )?;
        Ok(rows > 0)
    }

    /// Previously asked questions containing `fragment` (case-sensitive), in
    /// the order they were first asked.
    pub fn suggestions(&self, fragment: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT question FROM questions
             WHERE instr(question, ?) > 0
             ORDER BY id
             LIMIT ?",
        )?;
        let rows = stmt.query_map(params![fragment, MAX_SUGGESTIONS as i64], |row| {
            row.get::<_, String>(0)
        })?;
        rows.collect()
    }

    pub fn contains_question(&self, question: &str) -> Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM questions WHERE question = ?)",
            params![question.trim()],
            |row| row.get(0),
        )
    }

    pub fn question_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM questions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete every stored question. Returns how many were removed.
    pub fn clear_questions(&self) -> Result<usize> {
        self.conn.execute("DELETE FROM questions", [])
    }
}
