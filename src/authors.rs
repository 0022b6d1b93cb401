use rusqlite::Connection;

use crate::db::models::Author;

pub fn list_authors(conn: &Connection) -> rusqlite::Result<Vec<Author>> {
    let mut stmt = conn.prepare("SELECT id, name, avatar_url, role FROM authors ORDER BY name")?;
    let authors = stmt
        .query_map([], |row| {
            Ok(Author {
                id: row.get(0)?,
                name: row.get(1)?,
                avatar_url: row.get(2)?,
                role: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(authors)
}
