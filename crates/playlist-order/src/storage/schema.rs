use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
    pub primary_key: Vec<String>,
    /// Each entry is one (possibly composite) index.
    pub indexes: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Integer,
    Reference(String),
}

impl FieldType {
    pub fn to_sqlite_type(&self) -> &'static str {
        match self {
            FieldType::String => "TEXT",
            FieldType::Integer => "INTEGER",
            FieldType::Reference(_) => "TEXT",
        }
    }
}

impl FieldSchema {
    fn new(name: &str, field_type: FieldType, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required,
        }
    }
}

impl EntitySchema {
    pub fn create_table_sql(&self) -> String {
        let mut defs: Vec<String> = self
            .fields
            .iter()
            .map(|field| {
                let mut def = format!("{} {}", field.name, field.field_type.to_sqlite_type());
                if field.required {
                    def.push_str(" NOT NULL");
                }
                if let FieldType::Reference(target) = &field.field_type {
                    def.push_str(&format!(" REFERENCES {target}(id) ON DELETE CASCADE"));
                }
                def
            })
            .collect();

        defs.push(format!("PRIMARY KEY ({})", self.primary_key.join(", ")));

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            defs.join(", ")
        )
    }

    pub fn create_index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|columns| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({})",
                    self.name,
                    columns.join("_"),
                    self.name,
                    columns.join(", ")
                )
            })
            .collect()
    }
}

/// Playlists themselves; the order subsystem only checks they exist.
pub fn playlists_schema() -> EntitySchema {
    EntitySchema {
        name: "playlists".to_string(),
        fields: vec![FieldSchema::new("id", FieldType::String, true)],
        primary_key: vec!["id".to_string()],
        indexes: Vec::new(),
    }
}

/// Playlist/song links. `sort_key` is NULL or '' for rows that predate keyed ordering.
pub fn playlist_songs_schema() -> EntitySchema {
    EntitySchema {
        name: "playlist_songs".to_string(),
        fields: vec![
            FieldSchema::new(
                "playlist_id",
                FieldType::Reference("playlists".to_string()),
                true,
            ),
            FieldSchema::new("song_id", FieldType::String, true),
            FieldSchema::new("sort_key", FieldType::String, false),
            // microseconds since the Unix epoch
            FieldSchema::new("created_at", FieldType::Integer, true),
        ],
        primary_key: vec!["playlist_id".to_string(), "song_id".to_string()],
        indexes: vec![
            vec!["playlist_id".to_string(), "sort_key".to_string()],
            vec!["playlist_id".to_string(), "created_at".to_string()],
        ],
    }
}
