//! GraphQL type definitions
//!
//! These types mirror our domain models but are decorated with async-graphql attributes.
//! `Player` doubles as the payload of change events, so its serde field names are the
//! wire format of the `create` topic.

use async_graphql::{Enum, InputObject, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{PlayerPatch, PlayerRecord, UserRecord};
use crate::services::auth::IssuedToken;

/// Court position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum Position {
    #[graphql(name = "PG")]
    #[serde(rename = "PG")]
    PointGuard,
    #[graphql(name = "SG")]
    #[serde(rename = "SG")]
    ShootingGuard,
    #[graphql(name = "SF")]
    #[serde(rename = "SF")]
    SmallForward,
    #[graphql(name = "PF")]
    #[serde(rename = "PF")]
    PowerForward,
    #[graphql(name = "C")]
    #[serde(rename = "C")]
    Center,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::PointGuard => "PG",
            Position::ShootingGuard => "SG",
            Position::SmallForward => "SF",
            Position::PowerForward => "PF",
            Position::Center => "C",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PG" => Some(Position::PointGuard),
            "SG" => Some(Position::ShootingGuard),
            "SF" => Some(Position::SmallForward),
            "PF" => Some(Position::PowerForward),
            "C" => Some(Position::Center),
            _ => None,
        }
    }
}

/// Per-game season averages
#[derive(Debug, Clone, PartialEq, SimpleObject, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub season: String,
    pub points: f64,
    pub three_pt: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub turn_overs: f64,
    /// Minutes played
    pub mp: f64,
}

/// A player and their stats
#[derive(Debug, Clone, PartialEq, SimpleObject, Serialize, Deserialize)]
pub struct Player {
    pub pos: Position,
    pub name: String,
    pub age: i32,
    pub experience: i32,
    pub stats: Stats,
}

impl TryFrom<PlayerRecord> for Player {
    type Error = anyhow::Error;

    fn try_from(r: PlayerRecord) -> Result<Self, Self::Error> {
        let pos = Position::parse(&r.position)
            .ok_or_else(|| anyhow::anyhow!("Unknown position '{}' for {}", r.position, r.name))?;
        Ok(Player {
            pos,
            name: r.name,
            age: r.age,
            experience: r.experience,
            stats: Stats {
                season: r.season,
                points: r.points,
                three_pt: r.threept,
                rebounds: r.rebounds,
                assists: r.assists,
                steals: r.steals,
                blocks: r.blocks,
                turn_overs: r.turnovers,
                mp: r.mp,
            },
        })
    }
}

impl From<&Player> for PlayerRecord {
    fn from(p: &Player) -> Self {
        PlayerRecord {
            name: p.name.clone(),
            position: p.pos.as_str().to_string(),
            age: p.age,
            experience: p.experience,
            season: p.stats.season.clone(),
            points: p.stats.points,
            threept: p.stats.three_pt,
            rebounds: p.stats.rebounds,
            assists: p.stats.assists,
            steals: p.stats.steals,
            blocks: p.stats.blocks,
            turnovers: p.stats.turn_overs,
            mp: p.stats.mp,
        }
    }
}

/// An account. The password hash is never exposed.
#[derive(Debug, Clone, SimpleObject)]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        Self {
            id: r.id,
            username: r.username,
            created_at: r.created_at,
        }
    }
}

/// Signed access token
#[derive(Debug, Clone, SimpleObject)]
pub struct TokenPayload {
    /// JWT to send as the `Authorization` header
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for TokenPayload {
    fn from(t: IssuedToken) -> Self {
        Self {
            token: t.token,
            username: t.username,
            expires_at: t.expires_at,
        }
    }
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, InputObject)]
pub struct InputStats {
    pub season: String,
    pub points: f64,
    pub three_pt: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub turn_overs: f64,
    pub mp: f64,
}

#[derive(Debug, Clone, InputObject)]
pub struct InputPlayer {
    pub pos: Position,
    pub name: String,
    pub age: i32,
    pub experience: i32,
    pub stats: InputStats,
}

impl From<InputPlayer> for Player {
    fn from(input: InputPlayer) -> Self {
        Player {
            pos: input.pos,
            name: input.name,
            age: input.age,
            experience: input.experience,
            stats: Stats {
                season: input.stats.season,
                points: input.stats.points,
                three_pt: input.stats.three_pt,
                rebounds: input.stats.rebounds,
                assists: input.stats.assists,
                steals: input.stats.steals,
                blocks: input.stats.blocks,
                turn_overs: input.stats.turn_overs,
                mp: input.stats.mp,
            },
        }
    }
}

#[derive(Debug, Clone, Default, InputObject)]
pub struct InputUpdateStats {
    pub season: Option<String>,
    pub points: Option<f64>,
    pub three_pt: Option<f64>,
    pub rebounds: Option<f64>,
    pub assists: Option<f64>,
    pub steals: Option<f64>,
    pub blocks: Option<f64>,
    pub turn_overs: Option<f64>,
    pub mp: Option<f64>,
}

/// Partial player update; the player is selected by `name`
#[derive(Debug, Clone, InputObject)]
pub struct InputUpdatePlayer {
    pub name: String,
    pub pos: Option<Position>,
    pub age: Option<i32>,
    pub experience: Option<i32>,
    pub stats: Option<InputUpdateStats>,
}

impl From<InputUpdatePlayer> for PlayerPatch {
    fn from(input: InputUpdatePlayer) -> Self {
        let stats = input.stats.unwrap_or_default();
        PlayerPatch {
            position: input.pos.map(|p| p.as_str().to_string()),
            age: input.age,
            experience: input.experience,
            season: stats.season,
            points: stats.points,
            threept: stats.three_pt,
            rebounds: stats.rebounds,
            assists: stats.assists,
            steals: stats.steals,
            blocks: stats.blocks,
            turnovers: stats.turn_overs,
            mp: stats.mp,
        }
    }
}

#[derive(Debug, Clone, InputObject)]
pub struct InputUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, InputObject)]
pub struct UpdateUsername {
    pub old_username: String,
    pub new_username: String,
}

#[derive(Debug, Clone, InputObject)]
pub struct UpdatePassword {
    pub username: String,
    pub new_password: String,
}
