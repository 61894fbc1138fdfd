use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_catalog_tables::Migration),
            Box::new(m20240101_000002_create_orders_tables::Migration),
            Box::new(m20240101_000003_create_ledger_tables::Migration),
            Box::new(m20240101_000004_create_payment_transactions_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_catalog_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Entrepreneurs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Entrepreneurs::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Entrepreneurs::UserId).uuid().not_null().unique_key())
                        .col(ColumnDef::new(Entrepreneurs::BusinessName).string_len(200).not_null())
                        .col(ColumnDef::new(Entrepreneurs::Slug).string_len(100).not_null().unique_key())
                        .col(
                            ColumnDef::new(Entrepreneurs::CommissionRate)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(8),
                        )
                        .col(
                            ColumnDef::new(Entrepreneurs::TotalSales)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Entrepreneurs::TotalEarnings)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Entrepreneurs::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Entrepreneurs::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Entrepreneurs::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Products::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(Products::Name).string_len(200).not_null())
                        .col(ColumnDef::new(Products::Sku).string_len(100).not_null().unique_key())
                        .col(ColumnDef::new(Products::BasePrice).decimal_len(12, 2).not_null())
                        .col(
                            ColumnDef::new(Products::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(Products::StockQuantity).gte(0)),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariations::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ProductVariations::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(ProductVariations::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductVariations::VariationType).string_len(50).not_null())
                        .col(ColumnDef::new(ProductVariations::VariationValue).string_len(100).not_null())
                        .col(
                            ColumnDef::new(ProductVariations::PriceModifier)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductVariations::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(ProductVariations::StockQuantity).gte(0)),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_variations_product_id")
                                .from(ProductVariations::Table, ProductVariations::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_supplier_id")
                        .table(Products::Table)
                        .col(Products::SupplierId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductVariations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Entrepreneurs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Entrepreneurs {
        Table,
        Id,
        UserId,
        BusinessName,
        Slug,
        CommissionRate,
        TotalSales,
        TotalEarnings,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        SupplierId,
        Name,
        Sku,
        BasePrice,
        StockQuantity,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductVariations {
        Table,
        Id,
        ProductId,
        VariationType,
        VariationValue,
        PriceModifier,
        StockQuantity,
    }
}

mod m20240101_000002_create_orders_tables {

    use super::m20240101_000001_create_catalog_tables::Entrepreneurs;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Orders::OrderNumber).string_len(50).not_null().unique_key())
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::EntrepreneurId).uuid().not_null())
                        .col(ColumnDef::new(Orders::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string_len(50).null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Orders::MarkupAmount).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Orders::CommissionAmount).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Orders::ShippingFee).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Orders::TotalAmount).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).json().not_null())
                        .col(ColumnDef::new(Orders::TrackingNumber).string_len(100).null())
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone().not_null())
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_entrepreneur_id")
                                .from(Orders::Table, Orders::EntrepreneurId)
                                .to(Entrepreneurs::Table, Entrepreneurs::Id),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_orders_customer_id", Orders::CustomerId),
                ("idx_orders_entrepreneur_id", Orders::EntrepreneurId),
                ("idx_orders_supplier_id", Orders::SupplierId),
                ("idx_orders_status", Orders::Status),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Orders::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariationId).uuid().null())
                        .col(ColumnDef::new(OrderItems::ProductName).string_len(200).not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::UnitPrice).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(OrderItems::BasePrice).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(OrderItems::MarkupAmount).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(OrderItems::TotalPrice).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(OrderItems::CreatedAt).timestamp_with_time_zone().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderStatusHistory::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderStatusHistory::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(OrderStatusHistory::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderStatusHistory::Status).string_len(20).not_null())
                        .col(ColumnDef::new(OrderStatusHistory::Notes).text().null())
                        .col(ColumnDef::new(OrderStatusHistory::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(OrderStatusHistory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_status_history_order_id")
                                .from(OrderStatusHistory::Table, OrderStatusHistory::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_status_history_order_id")
                        .table(OrderStatusHistory::Table)
                        .col(OrderStatusHistory::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderStatusHistory::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        EntrepreneurId,
        SupplierId,
        Status,
        PaymentStatus,
        PaymentMethod,
        Subtotal,
        MarkupAmount,
        CommissionAmount,
        ShippingFee,
        TotalAmount,
        Currency,
        ShippingAddress,
        TrackingNumber,
        Notes,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        VariationId,
        ProductName,
        Quantity,
        UnitPrice,
        BasePrice,
        MarkupAmount,
        TotalPrice,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderStatusHistory {
        Table,
        Id,
        OrderId,
        Status,
        Notes,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240101_000003_create_ledger_tables {

    use super::m20240101_000001_create_catalog_tables::Entrepreneurs;
    use super::m20240101_000002_create_orders_tables::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Earnings::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Earnings::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Earnings::EntrepreneurId).uuid().not_null())
                        .col(ColumnDef::new(Earnings::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Earnings::EarningType).string_len(20).not_null())
                        .col(ColumnDef::new(Earnings::Amount).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Earnings::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Earnings::PayoutDate).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Earnings::CreatedAt).timestamp_with_time_zone().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_earnings_order_id")
                                .from(Earnings::Table, Earnings::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_earnings_entrepreneur_id")
                                .from(Earnings::Table, Earnings::EntrepreneurId)
                                .to(Entrepreneurs::Table, Entrepreneurs::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One earning per (order, type)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_earnings_order_type")
                        .table(Earnings::Table)
                        .col(Earnings::OrderId)
                        .col(Earnings::EarningType)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_earnings_entrepreneur_status")
                        .table(Earnings::Table)
                        .col(Earnings::EntrepreneurId)
                        .col(Earnings::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Wallets::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Wallets::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Wallets::UserId).uuid().not_null().unique_key())
                        .col(
                            ColumnDef::new(Wallets::Balance)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0)
                                .check(Expr::col(Wallets::Balance).gte(0)),
                        )
                        .col(
                            ColumnDef::new(Wallets::PendingBalance)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0)
                                .check(Expr::col(Wallets::PendingBalance).gte(0)),
                        )
                        .col(
                            ColumnDef::new(Wallets::TotalEarned)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Wallets::TotalWithdrawn)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Wallets::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Wallets::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Wallets::UpdatedAt).timestamp_with_time_zone().not_null())
                        .col(
                            ColumnDef::new(Wallets::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WithdrawalRequests::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(WithdrawalRequests::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(WithdrawalRequests::EntrepreneurId).uuid().not_null())
                        .col(ColumnDef::new(WithdrawalRequests::Amount).decimal_len(12, 2).not_null())
                        .col(
                            ColumnDef::new(WithdrawalRequests::ProcessingFee)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WithdrawalRequests::WithdrawalMethod)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WithdrawalRequests::DestinationDetails)
                                .json()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WithdrawalRequests::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(WithdrawalRequests::ReferenceId)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(WithdrawalRequests::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WithdrawalRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_withdrawal_requests_entrepreneur_id")
                                .from(WithdrawalRequests::Table, WithdrawalRequests::EntrepreneurId)
                                .to(Entrepreneurs::Table, Entrepreneurs::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_withdrawal_requests_entrepreneur_status")
                        .table(WithdrawalRequests::Table)
                        .col(WithdrawalRequests::EntrepreneurId)
                        .col(WithdrawalRequests::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WithdrawalRequests::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Wallets::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Earnings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Earnings {
        Table,
        Id,
        EntrepreneurId,
        OrderId,
        EarningType,
        Amount,
        Status,
        PayoutDate,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Wallets {
        Table,
        Id,
        UserId,
        Balance,
        PendingBalance,
        TotalEarned,
        TotalWithdrawn,
        Currency,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum WithdrawalRequests {
        Table,
        Id,
        EntrepreneurId,
        Amount,
        ProcessingFee,
        WithdrawalMethod,
        DestinationDetails,
        Status,
        ReferenceId,
        ProcessedAt,
        CreatedAt,
    }
}

mod m20240101_000004_create_payment_transactions_table {

    use super::m20240101_000002_create_orders_tables::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_payment_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentTransactions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(PaymentTransactions::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(PaymentTransactions::Reference)
                                .string_len(100)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PaymentTransactions::OrderId).uuid().not_null())
                        .col(ColumnDef::new(PaymentTransactions::UserId).uuid().not_null())
                        .col(ColumnDef::new(PaymentTransactions::Amount).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(PaymentTransactions::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(PaymentTransactions::Status).string_len(20).not_null())
                        .col(ColumnDef::new(PaymentTransactions::Provider).string_len(30).not_null())
                        .col(ColumnDef::new(PaymentTransactions::Metadata).json().not_null())
                        .col(
                            ColumnDef::new(PaymentTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentTransactions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_transactions_order_id")
                                .from(PaymentTransactions::Table, PaymentTransactions::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_transactions_order_id")
                        .table(PaymentTransactions::Table)
                        .col(PaymentTransactions::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PaymentTransactions {
        Table,
        Id,
        Reference,
        OrderId,
        UserId,
        Amount,
        Currency,
        Status,
        Provider,
        Metadata,
        CreatedAt,
        UpdatedAt,
    }
}
