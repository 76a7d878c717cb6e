// Copyright 2025 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! PostgreSQL access for the benchmark tests.

use boundpool::ObjectStatus;
use rand::Rng;
use serde::Serialize;
use sqlx::ConnectOptions;
use sqlx::Connection;
use sqlx::PgConnection;
use sqlx::postgres::PgConnectOptions;

/// Number of rows in the `World` table.
pub const WORLD_ROWS: i32 = 10_000;

/// Upper bound (inclusive) of `World.randomNumber`.
pub const MAX_RANDOM_NUMBER: i32 = 10_000;

const FORTUNES: &[&str] = &[
    "fortune: No such file or directory",
    "A computer scientist is someone who fixes things that aren't broken.",
    "After enough decimal places, nobody gives a damn.",
    "A bad random number generator: 1, 1, 1, 1, 1, 4.33e+67, 1, 1, 1",
    "A computer program does what you tell it to do, not what you want it to do.",
    "Emacs is a nice operating system, but I prefer UNIX. — Tom Christaensen",
    "Any program that runs right is obsolete.",
    "A list is only as strong as its weakest link. — Donald Knuth",
    "Feature: A bug with seniority.",
    "Computers make very fast, very accurate mistakes.",
    "<script>alert(\"This should not be displayed in a browser alert box.\");</script>",
    "フレームワークのベンチマーク",
];

#[derive(Debug)]
pub struct ManageConnection {
    option: PgConnectOptions,
}

impl ManageConnection {
    pub fn new(option: PgConnectOptions) -> Self {
        Self { option }
    }
}

impl boundpool::ManageObject for ManageConnection {
    type Object = PgConnection;
    type Error = sqlx::Error;

    async fn create(&self) -> Result<Self::Object, Self::Error> {
        self.option.connect().await
    }

    async fn is_recyclable(
        &self,
        conn: &mut Self::Object,
        _: &ObjectStatus,
    ) -> Result<(), Self::Error> {
        conn.ping().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct World {
    pub id: i32,
    #[serde(rename = "randomNumber")]
    pub random_number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fortune {
    pub id: i32,
    pub message: String,
}

pub fn random_number() -> i32 {
    rand::rng().random_range(1..=MAX_RANDOM_NUMBER)
}

pub async fn random_world(conn: &mut PgConnection) -> Result<World, sqlx::Error> {
    let id = rand::rng().random_range(1..=WORLD_ROWS);
    let (id, random_number): (i32, i32) =
        sqlx::query_as("SELECT id, randomNumber FROM World WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(World { id, random_number })
}

pub async fn update_world(conn: &mut PgConnection, world: World) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE World SET randomNumber = $1 WHERE id = $2")
        .bind(world.random_number)
        .bind(world.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn fortunes(conn: &mut PgConnection) -> Result<Vec<Fortune>, sqlx::Error> {
    let rows: Vec<(i32, String)> = sqlx::query_as("SELECT id, message FROM Fortune")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(id, message)| Fortune { id, message })
        .collect())
}

pub async fn create_tables(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE World (\
         id integer NOT NULL, \
         randomNumber integer NOT NULL default 0, \
         PRIMARY KEY (id))",
    )
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "CREATE TABLE Fortune (\
         id integer NOT NULL, \
         message varchar(2048) NOT NULL, \
         PRIMARY KEY (id))",
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn drop_tables(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DROP TABLE IF EXISTS World")
        .execute(&mut *conn)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS Fortune")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Fills `World` with [`WORLD_ROWS`] random rows and `Fortune` with the standard fixtures.
pub async fn populate(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    for id in 1..=WORLD_ROWS {
        sqlx::query("INSERT INTO World (id, randomNumber) VALUES ($1, $2)")
            .bind(id)
            .bind(random_number())
            .execute(&mut *conn)
            .await?;
    }
    for (id, message) in (1..).zip(FORTUNES) {
        sqlx::query("INSERT INTO Fortune (id, message) VALUES ($1, $2)")
            .bind::<i32>(id)
            .bind(*message)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
