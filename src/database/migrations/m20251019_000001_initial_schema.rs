//! Initial schema: albums, images and the vote edges between images

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Albums::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Albums::Id).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(Albums::Expires).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Images::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Images::AlbumId).big_integer().not_null())
                    .col(ColumnDef::new(Images::Id).big_integer().not_null())
                    .col(ColumnDef::new(Images::Src).string().not_null())
                    .col(ColumnDef::new(Images::Rating).double().not_null().default(0.0))
                    .col(ColumnDef::new(Images::Compressed).boolean().not_null().default(false))
                    .col(ColumnDef::new(Images::Position).integer().not_null())
                    .primary_key(Index::create().col(Images::AlbumId).col(Images::Id))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_images_album_id")
                            .from(Images::Table, Images::AlbumId)
                            .to(Albums::Table, Albums::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Edges::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Edges::AlbumId).big_integer().not_null())
                    .col(ColumnDef::new(Edges::FromId).big_integer().not_null())
                    .col(ColumnDef::new(Edges::ToId).big_integer().not_null())
                    .col(ColumnDef::new(Edges::Weight).big_integer().not_null().default(1))
                    .primary_key(
                        Index::create()
                            .col(Edges::AlbumId)
                            .col(Edges::FromId)
                            .col(Edges::ToId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_edges_album_id")
                            .from(Edges::Table, Edges::AlbumId)
                            .to(Albums::Table, Albums::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Rehydration scans albums that expire
        manager
            .create_index(
                Index::create()
                    .name("idx_albums_expires")
                    .table(Albums::Table)
                    .col(Albums::Expires)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Edges::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Images::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Albums::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Albums {
    Table,
    Id,
    Expires,
}

#[derive(DeriveIden)]
enum Images {
    Table,
    AlbumId,
    Id,
    Src,
    Rating,
    Compressed,
    Position,
}

#[derive(DeriveIden)]
enum Edges {
    Table,
    AlbumId,
    FromId,
    ToId,
    Weight,
}
