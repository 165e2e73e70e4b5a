//! Players repository: one row per player with the current season's stats

use anyhow::Result;
use sqlx::SqlitePool;

use super::unique_violation;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PlayerRecord {
    pub name: String,
    pub position: String,
    pub age: i32,
    pub experience: i32,
    pub season: String,
    pub points: f64,
    pub threept: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub turnovers: f64,
    pub mp: f64,
}

/// Partial update; `None` keeps the stored value. The name is the key and never changes.
#[derive(Debug, Clone, Default)]
pub struct PlayerPatch {
    pub position: Option<String>,
    pub age: Option<i32>,
    pub experience: Option<i32>,
    pub season: Option<String>,
    pub points: Option<f64>,
    pub threept: Option<f64>,
    pub rebounds: Option<f64>,
    pub assists: Option<f64>,
    pub steals: Option<f64>,
    pub blocks: Option<f64>,
    pub turnovers: Option<f64>,
    pub mp: Option<f64>,
}

impl PlayerPatch {
    fn apply(self, mut record: PlayerRecord) -> PlayerRecord {
        if let Some(v) = self.position {
            record.position = v;
        }
        if let Some(v) = self.age {
            record.age = v;
        }
        if let Some(v) = self.experience {
            record.experience = v;
        }
        if let Some(v) = self.season {
            record.season = v;
        }
        if let Some(v) = self.points {
            record.points = v;
        }
        if let Some(v) = self.threept {
            record.threept = v;
        }
        if let Some(v) = self.rebounds {
            record.rebounds = v;
        }
        if let Some(v) = self.assists {
            record.assists = v;
        }
        if let Some(v) = self.steals {
            record.steals = v;
        }
        if let Some(v) = self.blocks {
            record.blocks = v;
        }
        if let Some(v) = self.turnovers {
            record.turnovers = v;
        }
        if let Some(v) = self.mp {
            record.mp = v;
        }
        record
    }
}

const SELECT_PLAYER: &str = "SELECT name, position, age, experience, season, points, threept, \
     rebounds, assists, steals, blocks, turnovers, mp FROM players WHERE name = ?";

pub struct PlayerRepository {
    pool: SqlitePool,
}

impl PlayerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, name: &str) -> Result<Option<PlayerRecord>> {
        let row = sqlx::query_as::<_, PlayerRecord>(SELECT_PLAYER)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn create(&self, player: &PlayerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO players (name, position, age, experience, season, points, threept,
                rebounds, assists, steals, blocks, turnovers, mp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&player.name)
        .bind(&player.position)
        .bind(player.age)
        .bind(player.experience)
        .bind(&player.season)
        .bind(player.points)
        .bind(player.threept)
        .bind(player.rebounds)
        .bind(player.assists)
        .bind(player.steals)
        .bind(player.blocks)
        .bind(player.turnovers)
        .bind(player.mp)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, &player.name))?;
        Ok(())
    }

    /// Apply `patch` to the player called `name`; returns the stored result,
    /// or `None` if no such player exists
    pub async fn update(&self, name: &str, patch: PlayerPatch) -> Result<Option<PlayerRecord>> {
        let Some(existing) = self.get(name).await? else {
            return Ok(None);
        };
        let updated = patch.apply(existing);

        sqlx::query(
            r#"
            UPDATE players SET position = ?, age = ?, experience = ?, season = ?,
                points = ?, threept = ?, rebounds = ?, assists = ?, steals = ?, blocks = ?,
                turnovers = ?, mp = ?
            WHERE name = ?
            "#,
        )
        .bind(&updated.position)
        .bind(updated.age)
        .bind(updated.experience)
        .bind(&updated.season)
        .bind(updated.points)
        .bind(updated.threept)
        .bind(updated.rebounds)
        .bind(updated.assists)
        .bind(updated.steals)
        .bind(updated.blocks)
        .bind(updated.turnovers)
        .bind(updated.mp)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(Some(updated))
    }

    pub async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM players WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AlreadyExists, Database};

    fn record(name: &str) -> PlayerRecord {
        PlayerRecord {
            name: name.to_string(),
            position: "PG".to_string(),
            age: 27,
            experience: 5,
            season: "2023-24".to_string(),
            points: 24.5,
            threept: 3.1,
            rebounds: 5.2,
            assists: 7.8,
            steals: 1.4,
            blocks: 0.3,
            turnovers: 2.9,
            mp: 34.0,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = Database::in_memory().await.unwrap();
        let players = db.players();
        players.create(&record("X")).await.unwrap();

        assert_eq!(players.get("X").await.unwrap(), Some(record("X")));
        assert!(players.get("Y").await.unwrap().is_none());

        let duplicate = players.create(&record("X")).await.unwrap_err();
        assert!(duplicate.is::<AlreadyExists>());
    }

    #[tokio::test]
    async fn test_partial_update_keeps_unset_fields() {
        let db = Database::in_memory().await.unwrap();
        let players = db.players();
        players.create(&record("X")).await.unwrap();

        let updated = players
            .update(
                "X",
                PlayerPatch {
                    points: Some(30.0),
                    age: Some(28),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "X");
        assert_eq!(updated.points, 30.0);
        assert_eq!(updated.age, 28);
        assert_eq!(updated.assists, 7.8);
        assert_eq!(players.get("X").await.unwrap(), Some(updated));
        assert!(players.update("missing", PlayerPatch::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::in_memory().await.unwrap();
        let players = db.players();
        players.create(&record("X")).await.unwrap();

        assert!(players.delete("X").await.unwrap());
        assert!(!players.delete("X").await.unwrap());
    }
}
