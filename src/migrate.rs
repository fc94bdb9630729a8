use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usuarios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            codigo TEXT NOT NULL UNIQUE,
            nombre TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            rol TEXT NOT NULL CHECK (rol IN ('director', 'profesor')),
            escuela_id INTEGER,
            activo INTEGER NOT NULL DEFAULT 1,
            creado_en TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS edificios (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categorias (
            id INTEGER PRIMARY KEY,
            nombre TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inventario_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            inventario TEXT NOT NULL UNIQUE,
            descripcion TEXT,
            marca TEXT,
            valor TEXT NOT NULL DEFAULT '0',
            fecha_recibido TEXT NOT NULL,
            categoria_id INTEGER REFERENCES categorias(id),
            ubicacion_id INTEGER REFERENCES edificios(id),
            entregado_por_id INTEGER REFERENCES usuarios(id),
            recibido_por_id INTEGER REFERENCES usuarios(id),
            escuela_id INTEGER
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inventario_trazabilidad (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            inventario_id INTEGER NOT NULL REFERENCES inventario_items(id),
            fecha TEXT NOT NULL,
            accion TEXT NOT NULL,
            detalle TEXT,
            usuario_id INTEGER REFERENCES usuarios(id),
            meta TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_recibido_por ON inventario_items(recibido_por_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_traza_inventario ON inventario_trazabilidad(inventario_id, fecha DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_traza_usuario ON inventario_trazabilidad(usuario_id, fecha DESC)",
    )
    .execute(&pool)
    .await?;

    // Category ids are fixed by configuration, so seed them verbatim.
    for (name, id) in &config.categories.ids {
        sqlx::query(
            "INSERT INTO categorias (id, nombre) VALUES (?, ?) \
             ON CONFLICT(id) DO UPDATE SET nombre = excluded.nombre",
        )
        .bind(id)
        .bind(name)
        .execute(&pool)
        .await?;
    }

    pool.close().await;
    Ok(())
}
