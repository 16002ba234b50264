use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_customers_and_vehicles::Migration),
            Box::new(m20250301_000002_create_products_table::Migration),
            Box::new(m20250301_000003_create_service_visits_table::Migration),
            Box::new(m20250301_000004_create_coupon_tables::Migration),
            Box::new(m20250301_000005_create_invoice_tables::Migration),
            Box::new(m20250301_000006_create_warranties_table::Migration),
            Box::new(m20250301_000007_create_sequence_counters_table::Migration),
        ]
    }
}

mod m20250301_000001_create_customers_and_vehicles {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_customers_and_vehicles"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Customers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Email).string().null())
                        .col(ColumnDef::new(Customers::Phone).string().not_null())
                        .col(ColumnDef::new(Customers::Address).text().null())
                        .col(
                            ColumnDef::new(Customers::IsVerified)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Customers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Vehicles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Vehicles::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Vehicles::CustomerId).uuid().not_null())
                        .col(
                            ColumnDef::new(Vehicles::RegistrationNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Vehicles::Make).string().null())
                        .col(ColumnDef::new(Vehicles::Model).string().null())
                        .col(ColumnDef::new(Vehicles::Year).integer().null())
                        .col(ColumnDef::new(Vehicles::SelectedParts).json().not_null())
                        .col(ColumnDef::new(Vehicles::WarrantyCards).json().not_null())
                        .col(
                            ColumnDef::new(Vehicles::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Vehicles::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vehicles::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_vehicles_customer")
                                .from(Vehicles::Table, Vehicles::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_vehicles_customer_id")
                        .table(Vehicles::Table)
                        .col(Vehicles::CustomerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Vehicles::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Customers {
        Table,
        Id,
        Name,
        Email,
        Phone,
        Address,
        IsVerified,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Vehicles {
        Table,
        Id,
        CustomerId,
        RegistrationNumber,
        Make,
        Model,
        Year,
        SelectedParts,
        WarrantyCards,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000002_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Category).string().not_null())
                        .col(ColumnDef::new(Products::Brand).string().null())
                        .col(
                            ColumnDef::new(Products::SellingPriceCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::Warranty).string().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Category,
        Brand,
        SellingPriceCents,
        Stock,
        Warranty,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000003_create_service_visits_table {
    use super::m20250301_000001_create_customers_and_vehicles::Customers;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_service_visits_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ServiceVisits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ServiceVisits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ServiceVisits::CustomerId).uuid().not_null())
                        .col(
                            ColumnDef::new(ServiceVisits::VehicleNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ServiceVisits::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ServiceVisits::Complaint).text().null())
                        .col(ColumnDef::new(ServiceVisits::Notes).text().null())
                        .col(ColumnDef::new(ServiceVisits::Handlers).json().not_null())
                        .col(ColumnDef::new(ServiceVisits::BeforeImages).json().not_null())
                        .col(ColumnDef::new(ServiceVisits::AfterImages).json().not_null())
                        .col(ColumnDef::new(ServiceVisits::PartsUsed).json().not_null())
                        .col(
                            ColumnDef::new(ServiceVisits::StageTimestamps)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ServiceVisits::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(ServiceVisits::CreatedBy).string().null())
                        .col(
                            ColumnDef::new(ServiceVisits::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ServiceVisits::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_service_visits_customer")
                                .from(ServiceVisits::Table, ServiceVisits::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_service_visits_customer_status")
                        .table(ServiceVisits::Table)
                        .col(ServiceVisits::CustomerId)
                        .col(ServiceVisits::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ServiceVisits::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ServiceVisits {
        Table,
        Id,
        CustomerId,
        VehicleNumber,
        Status,
        Complaint,
        Notes,
        Handlers,
        BeforeImages,
        AfterImages,
        PartsUsed,
        StageTimestamps,
        Version,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000004_create_coupon_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000004_create_coupon_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Coupons::Code)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Coupons::Description).text().null())
                        .col(
                            ColumnDef::new(Coupons::DiscountType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::DiscountValue)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::MaxDiscountCents)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::MinPurchaseCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::UsageLimit).integer().null())
                        .col(ColumnDef::new(Coupons::PerCustomerLimit).integer().null())
                        .col(
                            ColumnDef::new(Coupons::UsedCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Coupons::ValidFrom)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::ValidUntil)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Coupons::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Coupons::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CouponUsages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CouponUsages::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CouponUsages::CouponId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::InvoiceId).uuid().not_null())
                        .col(ColumnDef::new(CouponUsages::CustomerId).uuid().not_null())
                        .col(
                            ColumnDef::new(CouponUsages::DiscountCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CouponUsages::UsedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupon_usages_coupon")
                                .from(CouponUsages::Table, CouponUsages::CouponId)
                                .to(Coupons::Table, Coupons::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_usages_coupon_customer")
                        .table(CouponUsages::Table)
                        .col(CouponUsages::CouponId)
                        .col(CouponUsages::CustomerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CouponUsages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
        Code,
        Description,
        DiscountType,
        DiscountValue,
        MaxDiscountCents,
        MinPurchaseCents,
        UsageLimit,
        PerCustomerLimit,
        UsedCount,
        ValidFrom,
        ValidUntil,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CouponUsages {
        Table,
        Id,
        CouponId,
        InvoiceId,
        CustomerId,
        DiscountCents,
        UsedAt,
    }
}

mod m20250301_000005_create_invoice_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000005_create_invoice_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Invoices::InvoiceNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Invoices::ServiceVisitId).uuid().not_null())
                        .col(ColumnDef::new(Invoices::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Invoices::VehicleNumber).string().not_null())
                        .col(ColumnDef::new(Invoices::CustomerDetails).json().not_null())
                        .col(ColumnDef::new(Invoices::VehicleDetails).json().not_null())
                        .col(ColumnDef::new(Invoices::Items).json().not_null())
                        .col(
                            ColumnDef::new(Invoices::SubtotalCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Invoices::DiscountType).string_len(20).null())
                        .col(
                            ColumnDef::new(Invoices::DiscountValue)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::DiscountCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Invoices::CouponId).uuid().null())
                        .col(ColumnDef::new(Invoices::CouponCode).string_len(64).null())
                        .col(
                            ColumnDef::new(Invoices::TaxRateBps)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::TaxCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Invoices::TotalCents).big_integer().not_null())
                        .col(ColumnDef::new(Invoices::PaidCents).big_integer().not_null())
                        .col(ColumnDef::new(Invoices::DueCents).big_integer().not_null())
                        .col(ColumnDef::new(Invoices::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Invoices::PaymentStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Invoices::PaymentMethod).string_len(20).null())
                        .col(ColumnDef::new(Invoices::RejectionReason).text().null())
                        .col(ColumnDef::new(Invoices::AccessToken).string_len(128).null())
                        .col(
                            ColumnDef::new(Invoices::AccessTokenExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Invoices::DocumentPath).string().null())
                        .col(ColumnDef::new(Invoices::ApprovalReport).json().null())
                        .col(ColumnDef::new(Invoices::Notes).text().null())
                        .col(ColumnDef::new(Invoices::Terms).text().null())
                        .col(
                            ColumnDef::new(Invoices::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Invoices::ApprovedBy).string().null())
                        .col(ColumnDef::new(Invoices::CreatedBy).string().null())
                        .col(
                            ColumnDef::new(Invoices::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_customer_status")
                        .table(Invoices::Table)
                        .col(Invoices::CustomerId)
                        .col(Invoices::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InvoicePayments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoicePayments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoicePayments::InvoiceId).uuid().not_null())
                        .col(
                            ColumnDef::new(InvoicePayments::AmountCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoicePayments::Mode)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoicePayments::TransactionId).string().null())
                        .col(ColumnDef::new(InvoicePayments::Notes).text().null())
                        .col(ColumnDef::new(InvoicePayments::RecordedBy).string().null())
                        .col(
                            ColumnDef::new(InvoicePayments::RecordedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoice_payments_invoice")
                                .from(InvoicePayments::Table, InvoicePayments::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_payments_invoice_id")
                        .table(InvoicePayments::Table)
                        .col(InvoicePayments::InvoiceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InvoicePayments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Invoices {
        Table,
        Id,
        InvoiceNumber,
        ServiceVisitId,
        CustomerId,
        VehicleNumber,
        CustomerDetails,
        VehicleDetails,
        Items,
        SubtotalCents,
        DiscountType,
        DiscountValue,
        DiscountCents,
        CouponId,
        CouponCode,
        TaxRateBps,
        TaxCents,
        TotalCents,
        PaidCents,
        DueCents,
        Status,
        PaymentStatus,
        PaymentMethod,
        RejectionReason,
        AccessToken,
        AccessTokenExpiresAt,
        DocumentPath,
        ApprovalReport,
        Notes,
        Terms,
        ApprovedAt,
        ApprovedBy,
        CreatedBy,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InvoicePayments {
        Table,
        Id,
        InvoiceId,
        AmountCents,
        Mode,
        TransactionId,
        Notes,
        RecordedBy,
        RecordedAt,
    }
}

mod m20250301_000006_create_warranties_table {
    use super::m20250301_000005_create_invoice_tables::Invoices;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000006_create_warranties_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Warranties::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Warranties::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Warranties::WarrantyNumber)
                                .string_len(40)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Warranties::InvoiceId).uuid().not_null())
                        .col(ColumnDef::new(Warranties::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Warranties::ProductId).string().not_null())
                        .col(ColumnDef::new(Warranties::ProductName).string().not_null())
                        .col(ColumnDef::new(Warranties::LineIndex).integer().not_null())
                        .col(
                            ColumnDef::new(Warranties::DurationMonths)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Warranties::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Warranties::StartDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Warranties::EndDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Warranties::Terms).text().null())
                        .col(
                            ColumnDef::new(Warranties::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Warranties::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_warranties_invoice")
                                .from(Warranties::Table, Warranties::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_warranties_invoice_line")
                        .table(Warranties::Table)
                        .col(Warranties::InvoiceId)
                        .col(Warranties::LineIndex)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_warranties_customer_id")
                        .table(Warranties::Table)
                        .col(Warranties::CustomerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Warranties::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Warranties {
        Table,
        Id,
        WarrantyNumber,
        InvoiceId,
        CustomerId,
        ProductId,
        ProductName,
        LineIndex,
        DurationMonths,
        Status,
        StartDate,
        EndDate,
        Terms,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000007_create_sequence_counters_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000007_create_sequence_counters_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SequenceCounters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SequenceCounters::Name)
                                .string_len(64)
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SequenceCounters::Value)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SequenceCounters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SequenceCounters {
        Table,
        Name,
        Value,
    }
}
