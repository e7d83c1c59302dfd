#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Mutex;

use relational_storage::rusqlite::Connection;
use relational_storage::{Association, Entity, Registry, Timestamp, connection};

#[derive(Clone, Debug, PartialEq, Entity)]
#[unique(realm)]
pub struct Realm {
    pub realm_id: Option<i64>,
    pub realm: String,
    pub bga_group: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Entity)]
#[unique(realm, username)]
pub struct User {
    pub user_id: Option<i64>,
    pub username: String,
    pub password: Vec<u8>,
    pub realm: Realm,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Entity)]
#[unique(platform, name)]
pub struct Game {
    pub game_id: Option<i64>,
    pub platform: String,
    pub name: String,
    pub min_players: i64,
    pub max_players: i64,
    pub weight: f64,
    pub cooperative: bool,
    pub artwork: Option<Vec<u8>>,
    pub added: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Entity)]
pub struct Tag {
    pub tag_id: Option<i64>,
    pub tag: String,
}

#[derive(Clone, Debug, PartialEq, Entity)]
pub struct Board {
    pub board_id: Option<i64>,
    pub realm: Option<Realm>,
    pub game: Game,
    pub link: String,
    pub min_seats: i64,
    pub max_seats: i64,
    pub created: Timestamp,
}

#[derive(Association)]
pub struct GameTags {
    pub game: Game,
    pub tag: Tag,
}

#[derive(Association)]
pub struct Vote {
    pub user: User,
    pub game: Game,
}

pub fn registry() -> Registry {
    let mut registry = Registry::new();

    registry.register::<Realm>().unwrap();
    registry.register::<User>().unwrap();
    registry.register::<Game>().unwrap();
    registry.register::<Tag>().unwrap();
    registry.register::<Board>().unwrap();
    registry.register_association::<GameTags>().unwrap();
    registry.register_association::<Vote>().unwrap();

    registry
}

pub fn setup() -> (Registry, Connection) {
    let registry = registry();
    let conn = connection::open_in_memory().unwrap();
    registry.create_tables(&conn).unwrap();

    (registry, conn)
}

pub fn realm(name: &str) -> Realm {
    Realm {
        realm_id: None,
        realm: name.to_string(),
        bga_group: None,
    }
}

pub fn user(name: &str, realm: &Realm) -> User {
    User {
        user_id: None,
        username: name.to_string(),
        password: name.as_bytes().to_vec(),
        realm: realm.clone(),
        role: "none".to_string(),
    }
}

pub fn game(platform: &str, name: &str) -> Game {
    Game {
        game_id: None,
        platform: platform.to_string(),
        name: name.to_string(),
        min_players: 2,
        max_players: 4,
        weight: 2.5,
        cooperative: false,
        artwork: None,
        added: Timestamp::from_epoch_seconds(1_600_000_000),
    }
}

pub fn tag(name: &str) -> Tag {
    Tag {
        tag_id: None,
        tag: name.to_string(),
    }
}

// Statement tracing for query-count assertions. The sink is shared process
// state, so tests that trace serialize on TRACE_GUARD.
static TRACED: Mutex<Vec<String>> = Mutex::new(Vec::new());
static TRACE_GUARD: Mutex<()> = Mutex::new(());

fn record_statement(sql: &str) {
    TRACED.lock().unwrap().push(sql.to_string());
}

/// Run `operations` with statement tracing enabled on the connection and
/// return every SQL statement it executed.
pub fn traced_statements(conn: &mut Connection, operations: impl FnOnce(&Connection)) -> Vec<String> {
    let _guard = TRACE_GUARD.lock().unwrap();

    TRACED.lock().unwrap().clear();
    conn.trace(Some(record_statement));
    operations(conn);
    conn.trace(None);

    TRACED.lock().unwrap().clone()
}
