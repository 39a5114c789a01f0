//! SQL schema for the civic SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    handle         TEXT    NOT NULL UNIQUE,
    email          TEXT    UNIQUE,              -- lowercased
    email_verified INTEGER NOT NULL DEFAULT 0,
    tier           TEXT    NOT NULL DEFAULT 'anonymous',
    civic_points   INTEGER NOT NULL DEFAULT 0,  -- = SUM(points_log.points_earned)
    created_at     TEXT    NOT NULL
);

-- Only a SHA-256 digest of each device token is kept.
CREATE TABLE IF NOT EXISTS device_sessions (
    token_hash TEXT    PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES users(user_id),
    created_at TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS civic_groups (
    group_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT    NOT NULL,
    description     TEXT    NOT NULL DEFAULT '',
    tags            TEXT    NOT NULL DEFAULT '[]',
    scope_level     TEXT    NOT NULL DEFAULT 'national',
    state_id        INTEGER,
    town_id         INTEGER,
    access_level    TEXT    NOT NULL DEFAULT 'open',
    status          TEXT    NOT NULL DEFAULT 'forming',
    public_readable INTEGER NOT NULL DEFAULT 0,
    public_voting   INTEGER NOT NULL DEFAULT 0,
    is_standard     INTEGER NOT NULL DEFAULT 0,
    created_by      INTEGER REFERENCES users(user_id),
    created_at      TEXT    NOT NULL,
    CHECK (public_voting = 0 OR public_readable = 1)
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id  INTEGER NOT NULL REFERENCES civic_groups(group_id),
    user_id   INTEGER NOT NULL REFERENCES users(user_id),
    role      TEXT    NOT NULL,   -- 'facilitator' | 'member' | 'observer'
    status    TEXT    NOT NULL DEFAULT 'active',
    joined_at TEXT    NOT NULL,
    PRIMARY KEY (group_id, user_id)
);

CREATE TABLE IF NOT EXISTS group_invites (
    invite_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id      INTEGER NOT NULL REFERENCES civic_groups(group_id),
    email         TEXT    NOT NULL,
    user_id       INTEGER REFERENCES users(user_id),
    invited_by    INTEGER NOT NULL REFERENCES users(user_id),
    accept_token  TEXT    NOT NULL UNIQUE,
    decline_token TEXT    NOT NULL UNIQUE,
    status        TEXT    NOT NULL DEFAULT 'pending',
    created_at    TEXT    NOT NULL,
    expires_at    TEXT    NOT NULL,
    resolved_at   TEXT
);

-- Exactly one of (user_id, session_id, clerk_key) identifies the author.
CREATE TABLE IF NOT EXISTS ideas (
    idea_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER REFERENCES users(user_id),
    session_id TEXT,
    clerk_key  TEXT,
    parent_id  INTEGER REFERENCES ideas(idea_id) ON DELETE SET NULL,
    content    TEXT    NOT NULL,
    category   TEXT    NOT NULL DEFAULT 'idea',
    status     TEXT    NOT NULL DEFAULT 'raw',
    tags       TEXT    NOT NULL DEFAULT '[]',
    source     TEXT    NOT NULL DEFAULT 'web',
    group_id   INTEGER REFERENCES civic_groups(group_id),
    shareable  INTEGER NOT NULL DEFAULT 0,
    edit_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT    NOT NULL,
    updated_at TEXT    NOT NULL,
    deleted_at TEXT,
    CHECK ((user_id IS NOT NULL) + (session_id IS NOT NULL) + (clerk_key IS NOT NULL) = 1)
);

-- Provenance edges. No ON DELETE action: a referenced idea cannot be
-- removed, and the triggers below forbid touching an edge once written.
CREATE TABLE IF NOT EXISTS synthesis_edges (
    digest_id  INTEGER NOT NULL REFERENCES ideas(idea_id),
    source_id  INTEGER NOT NULL REFERENCES ideas(idea_id),
    created_at TEXT    NOT NULL,
    PRIMARY KEY (digest_id, source_id)
);

CREATE TRIGGER IF NOT EXISTS synthesis_edges_no_update
BEFORE UPDATE ON synthesis_edges
BEGIN
    SELECT RAISE(ABORT, 'synthesis edges are immutable');
END;

CREATE TRIGGER IF NOT EXISTS synthesis_edges_no_delete
BEFORE DELETE ON synthesis_edges
BEGIN
    SELECT RAISE(ABORT, 'synthesis edges are immutable');
END;

-- Undirected: stored with idea_a < idea_b.
CREATE TABLE IF NOT EXISTS idea_links (
    link_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    idea_a     INTEGER NOT NULL REFERENCES ideas(idea_id) ON DELETE CASCADE,
    idea_b     INTEGER NOT NULL REFERENCES ideas(idea_id) ON DELETE CASCADE,
    kind       TEXT    NOT NULL DEFAULT 'related',
    created_by INTEGER REFERENCES users(user_id),
    created_at TEXT    NOT NULL,
    CHECK  (idea_a < idea_b),
    UNIQUE (idea_a, idea_b)
);

CREATE TABLE IF NOT EXISTS idea_votes (
    idea_id  INTEGER NOT NULL REFERENCES ideas(idea_id) ON DELETE CASCADE,
    user_id  INTEGER NOT NULL REFERENCES users(user_id),
    vote     INTEGER NOT NULL CHECK (vote IN (-1, 1)),
    voted_at TEXT    NOT NULL,
    PRIMARY KEY (idea_id, user_id)
);

-- Append-only. The only permitted UPDATE stamps a NULL user_id during a
-- session transfer.
CREATE TABLE IF NOT EXISTS points_log (
    log_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER REFERENCES users(user_id),
    session_id    TEXT,
    action_name   TEXT    NOT NULL,
    points_earned INTEGER NOT NULL,
    context_type  TEXT,
    context_id    TEXT,
    earned_at     TEXT    NOT NULL,
    CHECK (user_id IS NOT NULL OR session_id IS NOT NULL)
);

CREATE TRIGGER IF NOT EXISTS points_log_no_delete
BEFORE DELETE ON points_log
BEGIN
    SELECT RAISE(ABORT, 'points_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS points_log_claim_only
BEFORE UPDATE ON points_log
WHEN OLD.user_id IS NOT NULL
  OR NEW.user_id       IS NULL
  OR NEW.session_id    IS NOT OLD.session_id
  OR NEW.action_name   IS NOT OLD.action_name
  OR NEW.points_earned IS NOT OLD.points_earned
  OR NEW.context_type  IS NOT OLD.context_type
  OR NEW.context_id    IS NOT OLD.context_id
  OR NEW.earned_at     IS NOT OLD.earned_at
BEGIN
    SELECT RAISE(ABORT, 'points_log is append-only');
END;

CREATE INDEX IF NOT EXISTS ideas_group_idx       ON ideas(group_id, created_at);
CREATE INDEX IF NOT EXISTS ideas_parent_idx      ON ideas(parent_id);
CREATE INDEX IF NOT EXISTS ideas_user_idx        ON ideas(user_id);
CREATE INDEX IF NOT EXISTS ideas_session_idx     ON ideas(session_id);
CREATE INDEX IF NOT EXISTS edges_source_idx      ON synthesis_edges(source_id);
CREATE INDEX IF NOT EXISTS members_user_idx      ON group_members(user_id);
CREATE INDEX IF NOT EXISTS invites_group_idx     ON group_invites(group_id, email);
CREATE INDEX IF NOT EXISTS points_user_idx       ON points_log(user_id, action_name, earned_at);
CREATE INDEX IF NOT EXISTS points_session_idx    ON points_log(session_id, action_name, earned_at);

PRAGMA user_version = 1;
";
