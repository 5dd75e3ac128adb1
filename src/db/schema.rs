/// Named JSON documents, one per feature module.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cog_config (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        data TEXT NOT NULL,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
";
