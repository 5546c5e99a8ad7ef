//! Declarative description of the tenant schema.
//!
//! Every tenant database carries the same tables. The catalog is the single
//! place that knows their columns, constraints and relationships; the entity
//! API validates writes against it and the assistant falls back to it when the
//! live schema cannot be discovered.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::model::enums::{DeleteBehavior, PunchType, Status};
use crate::utils::db_utils::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    Guid,
    Text,
    Int,
    Decimal,
    Double,
    Bool,
    DateTime,
    Time,
}

impl ColumnKind {
    fn label(self) -> &'static str {
        match self {
            ColumnKind::Guid => "GUID",
            ColumnKind::Text => "text",
            ColumnKind::Int => "int",
            ColumnKind::Decimal => "decimal(18,2)",
            ColumnKind::Double => "float",
            ColumnKind::Bool => "bit",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Time => "time",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    pub max_len: Option<usize>,
    /// Maintained by the server (audit trail, identity); never accepted from clients.
    #[serde(skip)]
    pub managed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForeignKeyDef {
    pub column: &'static str,
    pub references: &'static str,
    pub on_delete: DeleteBehavior,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDef {
    pub name: &'static str,
    pub entity: &'static str,
    pub key: &'static str,
    pub is_view: bool,
    pub columns: Vec<ColumnDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    Update,
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("{}", .0.join("; "))]
pub struct ValidationError(pub Vec<String>);

const AUDIT_COLUMNS: [(&str, ColumnKind, bool); 8] = [
    ("Id", ColumnKind::Guid, true),
    ("Creator", ColumnKind::Text, true),
    ("CreationTime", ColumnKind::DateTime, true),
    ("LastModifier", ColumnKind::Text, false),
    ("LastModificationTime", ColumnKind::DateTime, false),
    ("Deleter", ColumnKind::Text, false),
    ("DeletionTime", ColumnKind::DateTime, false),
    ("IsDeleted", ColumnKind::Bool, true),
];

impl TableDef {
    /// A soft-deletable, audited entity table with a `Status` column.
    fn entity(name: &'static str, entity: &'static str) -> Self {
        let mut columns: Vec<ColumnDef> = AUDIT_COLUMNS
            .iter()
            .map(|&(name, kind, required)| ColumnDef {
                name,
                kind,
                required,
                max_len: None,
                managed: true,
            })
            .collect();

        columns.push(ColumnDef {
            name: "Status",
            kind: ColumnKind::Int,
            required: false,
            max_len: None,
            managed: false,
        });

        Self {
            name,
            entity,
            key: "Id",
            is_view: false,
            columns,
            foreign_keys: Vec::new(),
        }
    }

    fn view(name: &'static str, entity: &'static str, key: &'static str) -> Self {
        Self {
            name,
            entity,
            key,
            is_view: true,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    fn col(
        mut self,
        name: &'static str,
        kind: ColumnKind,
        required: bool,
        max_len: Option<usize>,
    ) -> Self {
        self.columns.push(ColumnDef {
            name,
            kind,
            required,
            max_len,
            managed: false,
        });
        self
    }

    fn req_text(self, name: &'static str, max_len: usize) -> Self {
        self.col(name, ColumnKind::Text, true, Some(max_len))
    }

    fn text(self, name: &'static str, max_len: usize) -> Self {
        self.col(name, ColumnKind::Text, false, Some(max_len))
    }

    fn opt_text(self, name: &'static str) -> Self {
        self.col(name, ColumnKind::Text, false, None)
    }

    fn req(self, name: &'static str, kind: ColumnKind) -> Self {
        self.col(name, kind, true, None)
    }

    fn opt(self, name: &'static str, kind: ColumnKind) -> Self {
        self.col(name, kind, false, None)
    }

    /// Reference column; required references cascade, optional ones are nulled.
    fn fk(self, column: &'static str, references: &'static str, required: bool) -> Self {
        let on_delete = if required {
            DeleteBehavior::Cascade
        } else {
            DeleteBehavior::SetNull
        };

        let mut table = self.col(column, ColumnKind::Guid, required, None);
        table.foreign_keys.push(ForeignKeyDef {
            column,
            references,
            on_delete,
        });
        table
    }

    fn on_delete(mut self, column: &str, behavior: DeleteBehavior) -> Self {
        if let Some(fk) = self.foreign_keys.iter_mut().find(|fk| fk.column == column) {
            fk.on_delete = behavior;
        }
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_company(&self) -> bool {
        self.column("CompanyId").is_some()
    }

    pub fn soft_deletes(&self) -> bool {
        !self.is_view && self.column("IsDeleted").is_some()
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyDef> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.column.eq_ignore_ascii_case(column))
    }

    pub fn validate_insert(&self, payload: &Value) -> Result<Vec<(&ColumnDef, SqlValue)>, ValidationError> {
        self.validate(payload, WriteMode::Insert)
    }

    pub fn validate_update(&self, payload: &Value) -> Result<Vec<(&ColumnDef, SqlValue)>, ValidationError> {
        self.validate(payload, WriteMode::Update)
    }

    /// Check a JSON object against the table's constraints and convert it to
    /// bindable values in payload order.
    pub fn validate(
        &self,
        payload: &Value,
        mode: WriteMode,
    ) -> Result<Vec<(&ColumnDef, SqlValue)>, ValidationError> {
        if self.is_view {
            return Err(ValidationError(vec![format!(
                "{} is a read-only view",
                self.name
            )]));
        }

        let obj = payload
            .as_object()
            .ok_or_else(|| ValidationError(vec!["Payload must be a JSON object".into()]))?;

        if mode == WriteMode::Update && obj.is_empty() {
            return Err(ValidationError(vec!["No fields provided for update".into()]));
        }

        let mut errors = Vec::new();
        let mut values = Vec::with_capacity(obj.len());

        for (key, value) in obj {
            let Some(column) = self.column(key) else {
                errors.push(format!("Unknown column '{}' for {}", key, self.name));
                continue;
            };

            if column.managed {
                errors.push(format!("{} is maintained by the server", column.name));
                continue;
            }

            match convert_value(column, value) {
                Ok(v) => values.push((column, v)),
                Err(e) => errors.push(e),
            }
        }

        if mode == WriteMode::Insert {
            for column in self.columns.iter().filter(|c| c.required && !c.managed) {
                let present = obj
                    .iter()
                    .any(|(k, v)| k.eq_ignore_ascii_case(column.name) && !v.is_null());
                if !present {
                    errors.push(format!("{} is required", column.name));
                }
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            errors.sort();
            errors.dedup();
            Err(ValidationError(errors))
        }
    }

    fn render(&self, out: &mut String) {
        if self.is_view {
            let _ = writeln!(
                out,
                "View: {} (entity {}, read-only, key {})",
                self.name, self.entity, self.key
            );
        } else {
            let _ = writeln!(out, "Table: {} (entity {})", self.name, self.entity);
        }

        let _ = writeln!(out, "Columns:");
        for column in &self.columns {
            let mut line = format!("  - {}: {}", column.name, column.kind.label());
            if let Some(max) = column.max_len {
                let _ = write!(line, "({max})");
            }
            line.push_str(if column.required { ", required" } else { ", nullable" });
            if column.name == self.key {
                line.push_str(", primary key");
            }
            let _ = writeln!(out, "{line}");
        }

        if !self.foreign_keys.is_empty() {
            let _ = writeln!(out, "Foreign keys:");
            for fk in &self.foreign_keys {
                let _ = writeln!(
                    out,
                    "  - {} -> {}.Id (on delete: {})",
                    fk.column, fk.references, fk.on_delete
                );
            }
        }
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn convert_value(column: &ColumnDef, value: &Value) -> Result<SqlValue, String> {
    let name = column.name;

    if value.is_null() {
        return if column.required {
            Err(format!("{name} is required"))
        } else {
            Ok(SqlValue::Null)
        };
    }

    match column.kind {
        ColumnKind::Guid => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(|id| SqlValue::String(id.hyphenated().to_string()))
            .ok_or_else(|| format!("{name} must be a GUID")),

        ColumnKind::Text => {
            let s = value
                .as_str()
                .ok_or_else(|| format!("{name} must be a string"))?;
            match column.max_len {
                Some(max) if s.chars().count() > max => {
                    Err(format!("{name} exceeds the maximum length of {max}"))
                }
                _ => Ok(SqlValue::String(s.to_string())),
            }
        }

        ColumnKind::Int => {
            let id = match value {
                Value::Number(n) => n.as_i64(),
                // Enum columns also accept their variant names.
                Value::String(s) if name == "Status" => Status::from_str(s).ok().map(|v| v as i64),
                Value::String(s) if name == "PunchType" => {
                    PunchType::from_str(s).ok().map(|v| v as i64)
                }
                _ => None,
            }
            .ok_or_else(|| format!("{name} must be an integer"))?;

            let known = match name {
                "Status" => Status::from_id(id).is_some(),
                "PunchType" => PunchType::from_id(id).is_some(),
                _ => true,
            };
            if known {
                Ok(SqlValue::I64(id))
            } else {
                Err(format!("{name} has an unknown value {id}"))
            }
        }

        ColumnKind::Decimal => {
            let parsed = match value {
                Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
                Value::String(s) => Decimal::from_str(s.trim()).ok(),
                _ => None,
            };
            parsed
                .map(SqlValue::Decimal)
                .ok_or_else(|| format!("{name} must be a decimal number"))
        }

        ColumnKind::Double => value
            .as_f64()
            .map(SqlValue::F64)
            .ok_or_else(|| format!("{name} must be a number")),

        ColumnKind::Bool => match value {
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(SqlValue::Bool(false)),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(SqlValue::Bool(true)),
            _ => Err(format!("{name} must be a boolean")),
        },

        ColumnKind::DateTime => value
            .as_str()
            .and_then(parse_datetime)
            .map(SqlValue::DateTime)
            .ok_or_else(|| format!("{name} must be a date/time")),

        ColumnKind::Time => value
            .as_str()
            .and_then(|s| {
                NaiveTime::parse_from_str(s, "%H:%M:%S")
                    .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                    .ok()
            })
            .map(SqlValue::Time)
            .ok_or_else(|| format!("{name} must be a time of day (HH:MM[:SS])")),
    }
}

#[derive(Debug)]
pub struct Catalog {
    tables: Vec<TableDef>,
}

impl Catalog {
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// Lookup by table name (`Employees`) or entity name (`Employee`).
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| {
            t.name.eq_ignore_ascii_case(name) || t.entity.eq_ignore_ascii_case(name)
        })
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.name).collect()
    }

    /// Schema description handed to the assistant when the live database
    /// cannot be inspected.
    pub fn render_context(&self) -> String {
        let mut out = String::from(
            "Database schema (built-in entity catalog). Every entity table has the audit \
             columns Id, Creator, CreationTime, LastModifier, LastModificationTime, Deleter, \
             DeletionTime, IsDeleted and an integer Status. Rows with IsDeleted = 1 are \
             soft-deleted and should normally be excluded.\n",
        );

        for table in &self.tables {
            out.push('\n');
            table.render(&mut out);
        }

        out
    }
}

pub fn catalog() -> &'static Catalog {
    &CATALOG
}

static CATALOG: Lazy<Catalog> = Lazy::new(build_catalog);

fn named(name: &'static str, entity: &'static str) -> TableDef {
    TableDef::entity(name, entity)
        .text("NameAr", 255)
        .req_text("NameEn", 255)
}

fn build_catalog() -> Catalog {
    use ColumnKind::*;

    let tables = vec![
        // Reference data
        named("Currencies", "Currency")
            .text("Code", 50)
            .opt_text("Symbol")
            .opt("ExchangeRate", ColumnKind::Decimal),
        named("Countries", "Country")
            .text("Code", 50)
            .opt_text("PhoneCode")
            .fk("CurrencyId", "Currencies", false),
        named("Regions", "Region").fk("CountryId", "Countries", false),
        named("Cities", "City").fk("CountryId", "Countries", false),
        named("Nationalities", "Nationality"),
        // Organisation
        named("Companies", "Company")
            .opt_text("ReferenceNo")
            .opt("HasUserAccount", Bool)
            .opt("FileId", Guid),
        named("Projects", "Project")
            .opt_text("ReferenceNo")
            .req("StartDate", DateTime)
            .opt("EndDate", DateTime)
            .opt("Budget", ColumnKind::Decimal)
            .opt_text("AddressAr")
            .opt_text("AddressEn"),
        named("Sites", "Site")
            .opt("Latitude", Double)
            .opt("Longitude", Double)
            .opt("Radius", Double)
            .opt_text("Location")
            .fk("ProjectId", "Projects", true),
        named("Categories", "Category"),
        named("Specifications", "Specification")
            .fk("CategoryId", "Categories", false)
            .opt_text("DescriptionEn")
            .opt_text("DescriptionAr"),
        named("Positions", "Position")
            .opt_text("DescriptionEn")
            .opt_text("DescriptionAr")
            .fk("SpecificationId", "Specifications", false),
        TableDef::entity("MainContractors", "MainContractor")
            .req_text("Name", 255)
            .opt_text("ReferenceNo")
            .opt("HasUserAccount", Bool)
            .fk("CompanyId", "Companies", true)
            .fk("UserDetailId", "UserDetails", false),
        TableDef::entity("MainContractorProjects", "MainContractorProject")
            .fk("MainContractorId", "MainContractors", false)
            .fk("ProjectId", "Projects", true),
        TableDef::entity("SubContractorTypes", "SubContractorType")
            .req_text("NameEn", 255)
            .text("NameAr", 255)
            .fk("CompanyId", "Companies", true),
        TableDef::entity("SubContractors", "SubContractor")
            .req_text("Name", 255)
            .opt_text("ReferenceNo")
            .opt("HasUserAccount", Bool)
            .fk("CompanyId", "Companies", true)
            .fk("MainContractorId", "MainContractors", true)
            .fk("UserDetailId", "UserDetails", false)
            .fk("SubContractorTypeId", "SubContractorTypes", true),
        // Workforce
        TableDef::entity("UserDetails", "UserDetail")
            .text("FirstNameAr", 255)
            .req_text("FirstNameEn", 255)
            .text("LastNameAr", 255)
            .req_text("LastNameEn", 255)
            .opt_text("GovId")
            .opt_text("Code")
            .opt_text("Email")
            .opt_text("Phone")
            .opt("ContractedWorkHours", Int)
            .opt("ContractedOverTime", Bool)
            .opt("DateOfBirth", DateTime)
            .opt("Gender", Int)
            .req("JoiningDate", DateTime)
            .opt("EmploymentType", Int)
            .opt("CanLogin", Bool)
            .opt("AttendanceType", Int)
            .fk("CountryId", "Countries", false)
            .fk("CompanyId", "Companies", true)
            .req("UserId", Guid)
            .fk("ParentId", "SubContractors", false)
            .fk("RegionId", "Regions", false)
            .fk("NationalityId", "Nationalities", false)
            .fk("PositionId", "Positions", false)
            .fk("MainContractorId", "MainContractors", false)
            .fk("SubContractorId", "SubContractors", false)
            .fk("EmployeeId", "Employees", false),
        TableDef::entity("Employees", "Employee")
            .req_text("Name", 255)
            .opt_text("ReferenceNo")
            .opt("HasUserAccount", Bool)
            .opt("HasSchedule", Bool)
            .fk("CompanyId", "Companies", true)
            .fk("UserDetailId", "UserDetails", false)
            .fk("ScheduleId", "Schedules", false)
            .fk("SubContractorId", "SubContractors", true)
            .fk("ProjectId", "Projects", true)
            .fk("CategoryId", "Categories", true)
            .fk("SpecificationId", "Specifications", true)
            .fk("PositionId", "Positions", true)
            .opt("AllowGeoPunching", Bool)
            .opt_text("DeviceToken")
            .opt_text("DeviceType")
            .opt_text("DeviceId")
            .opt("DeviceLastActive", DateTime),
        TableDef::entity("Devices", "Device")
            .req_text("Name", 255)
            .opt_text("SerialNo")
            .fk("CompanyId", "Companies", true)
            .fk("ProjectId", "Projects", false),
        TableDef::entity("EmployeeSites", "EmployeeSite")
            .fk("EmployeeId", "Employees", false)
            .fk("SiteId", "Sites", true)
            .fk("CompanyId", "Companies", true),
        // Scheduling
        TableDef::entity("Schedules", "Schedule")
            .req_text("Name", 255)
            .req("StartTime", Time)
            .opt("EndTime", Time)
            .opt("BufferStartMinutes", Int)
            .opt("BufferEndMinutes", Int)
            .opt("MinCheckInHours", Int)
            .opt("MaxCheckOutHours", Int)
            .opt("IsHolidayPaid", Bool)
            .opt_text("HolidayConditions")
            .fk("CompanyId", "Companies", true)
            .fk("ProjectId", "Projects", false),
        TableDef::entity("ScheduleDays", "ScheduleDay")
            .fk("ScheduleId", "Schedules", true)
            .req("Day", Int)
            .opt("StartTime", Time)
            .opt("EndTime", Time)
            .opt("BreakDurationMinutes", Int)
            .opt("IsBreakPaid", Bool)
            .opt("OvertimeMultiplier", ColumnKind::Decimal)
            .opt("MaxOvertimeHours", Int)
            .opt("IsWorkDay", Bool),
        TableDef::entity("ShiftSchedules", "ShiftSchedule")
            .req_text("Name", 255)
            .opt("IsRotating", Bool)
            .opt("RotationDays", Int)
            .opt("BufferStartMinutes", Int)
            .opt("BufferEndMinutes", Int)
            .opt("IsHolidayPaid", Bool)
            .opt_text("HolidayConditions")
            .fk("CompanyId", "Companies", true)
            .fk("ProjectId", "Projects", false),
        TableDef::entity("Shifts", "Shift")
            .fk("ShiftScheduleId", "ShiftSchedules", true)
            .req_text("Name", 255)
            .opt("DayInRotation", Int)
            .opt("StartTime", Time)
            .opt("EndTime", Time)
            .opt("BreakDurationMinutes", Int)
            .opt("IsBreakPaid", Bool)
            .opt("OvertimeMultiplier", ColumnKind::Decimal)
            .opt("MaxOvertimeHours", Int)
            .opt("IsActive", Bool),
        TableDef::entity("ShiftAssignments", "ShiftAssignment")
            .fk("EmployeeId", "Employees", true)
            .fk("ShiftScheduleId", "ShiftSchedules", true)
            .fk("ShiftId", "Shifts", true)
            .req("StartDate", DateTime)
            .opt("EndDate", DateTime),
        // Time tracking
        TableDef::entity("EmployeeAttendances", "EmployeeAttendance")
            .fk("EmployeeId", "Employees", true)
            .req("AttendanceDate", DateTime)
            .opt("HasSchedule", Bool)
            .fk("ScheduleId", "Schedules", false)
            .fk("CompanyId", "Companies", true)
            .fk("ShiftId", "Shifts", false)
            .opt("TimeIn", DateTime)
            .opt("TimeOut", DateTime)
            .opt("BreakFrom", DateTime)
            .opt("BreakTo", DateTime)
            .req("TotalWorkHours", ColumnKind::Decimal)
            .req("ApprovedWorkHours", ColumnKind::Decimal)
            .req("TotalOverTime", ColumnKind::Decimal)
            .req("ApprovedOverTime", ColumnKind::Decimal)
            .req("AttendanceStatus", Int)
            .req("TransactionDate", DateTime)
            .req("HasException", Bool)
            .req("IsActualBreak", Bool)
            .req("ScheduleWorkHours", ColumnKind::Decimal)
            .req("IsReseted", Bool)
            .req("IsPublicHoliday", Bool)
            .req("BreakDeductionHours", ColumnKind::Decimal)
            .fk("ProjectId", "Projects", false)
            .req("ScheduleType", Text)
            .opt_text("HolidayCondition")
            .opt("IsHoliday", Bool)
            .opt("Source", Int),
        TableDef::entity("PunchLogs", "PunchLog")
            .fk("EmployeeId", "Employees", true)
            .fk("DeviceId", "Devices", false)
            .fk("CompanyId", "Companies", true)
            .fk("SiteId", "Sites", true)
            .fk("ProjectId", "Projects", true)
            .req("Latitude", Double)
            .req("Longitude", Double)
            .opt_text("ImgSrc")
            .req("PunchDateTime", DateTime)
            .req("PunchType", Int)
            .on_delete("SiteId", DeleteBehavior::NoAction),
        TableDef::entity("Notifications", "Notification")
            .req("UserId", Guid)
            .fk("CompanyId", "Companies", true)
            .req_text("Title", 255)
            .req("Message", Text)
            .req("Type", Text),
        // Dashboard view
        TableDef::view(
            "vw_EmployeeAttendanceDashboard",
            "EmployeeAttendanceDashboard",
            "AttendanceId",
        )
        .req("AttendanceId", Guid)
        .req("EmployeeId", Guid)
        .opt_text("EmployeeName")
        .req("CompanyId", Guid)
        .opt("ProjectId", Guid)
        .opt_text("ProjectName")
        .req("AttendanceDate", DateTime)
        .opt("TimeIn", DateTime)
        .opt("TimeOut", DateTime)
        .opt("TotalWorkHours", ColumnKind::Decimal)
        .opt("TotalOverTime", ColumnKind::Decimal)
        .opt("AttendanceStatus", Int),
    ];

    Catalog { tables }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_accepts_table_or_entity_names() {
        let catalog = catalog();

        assert_eq!(catalog.table("punchlogs").unwrap().name, "PunchLogs");
        assert_eq!(catalog.table("PunchLog").unwrap().name, "PunchLogs");
        assert_eq!(
            catalog.table("EmployeeAttendanceDashboard").unwrap().name,
            "vw_EmployeeAttendanceDashboard"
        );
        assert!(catalog.table("Users").is_none());
    }

    #[test]
    fn every_foreign_key_points_at_a_known_table() {
        let catalog = catalog();
        for table in catalog.tables() {
            for fk in &table.foreign_keys {
                assert!(
                    catalog.table(fk.references).is_some(),
                    "{}.{} references unknown {}",
                    table.name,
                    fk.column,
                    fk.references
                );
                assert!(table.column(fk.column).is_some());
            }
        }
    }

    #[test]
    fn punch_log_site_does_not_cascade() {
        let punch_logs = catalog().table("PunchLogs").unwrap();

        assert_eq!(
            punch_logs.foreign_key("SiteId").unwrap().on_delete,
            DeleteBehavior::NoAction
        );
        assert_eq!(
            punch_logs.foreign_key("EmployeeId").unwrap().on_delete,
            DeleteBehavior::Cascade
        );
        assert_eq!(
            punch_logs.foreign_key("DeviceId").unwrap().on_delete,
            DeleteBehavior::SetNull
        );
    }

    #[test]
    fn dashboard_view_is_read_only() {
        let view = catalog().table("vw_EmployeeAttendanceDashboard").unwrap();

        assert!(view.is_view);
        assert!(!view.soft_deletes());
        let err = view
            .validate(&json!({"EmployeeName": "x"}), WriteMode::Update)
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn insert_requires_required_columns() {
        let devices = catalog().table("Devices").unwrap();

        let err = devices
            .validate(&json!({"SerialNo": "X-1"}), WriteMode::Insert)
            .unwrap_err();
        assert!(err.0.contains(&"Name is required".to_string()));
        assert!(err.0.contains(&"CompanyId is required".to_string()));

        let company = Uuid::new_v4().to_string();
        let values = devices
            .validate(
                &json!({"Name": "Gate reader", "CompanyId": company, "Status": "Active"}),
                WriteMode::Insert,
            )
            .unwrap();
        assert_eq!(values.len(), 3);
        assert!(
            values
                .iter()
                .any(|(c, v)| c.name == "Status" && matches!(v, SqlValue::I64(1)))
        );
    }

    #[test]
    fn max_length_is_enforced() {
        let companies = catalog().table("Companies").unwrap();
        let long_name = "a".repeat(256);

        let err = companies
            .validate(&json!({"NameEn": long_name}), WriteMode::Update)
            .unwrap_err();
        assert_eq!(
            err.0,
            vec!["NameEn exceeds the maximum length of 255".to_string()]
        );

        assert!(
            companies
                .validate(&json!({"NameEn": "a".repeat(255)}), WriteMode::Update)
                .is_ok()
        );
    }

    #[test]
    fn managed_and_unknown_columns_are_rejected() {
        let employees = catalog().table("Employees").unwrap();

        let err = employees
            .validate(
                &json!({"IsDeleted": true, "Salary": 10, "Name": "A"}),
                WriteMode::Update,
            )
            .unwrap_err();
        assert!(err.0.contains(&"IsDeleted is maintained by the server".to_string()));
        assert!(err.0.contains(&"Unknown column 'Salary' for Employees".to_string()));
    }

    #[test]
    fn values_are_typed_per_column() {
        let attendance = catalog().table("EmployeeAttendances").unwrap();

        let values = attendance
            .validate(
                &json!({
                    "TotalWorkHours": 8.5,
                    "TimeIn": "2025-03-01T08:00:00",
                    "HasException": 0,
                    "ScheduleId": null
                }),
                WriteMode::Update,
            )
            .unwrap();

        for (column, value) in values {
            match column.name {
                "TotalWorkHours" => {
                    assert!(matches!(value, SqlValue::Decimal(d) if d == Decimal::new(85, 1)))
                }
                "TimeIn" => assert!(matches!(value, SqlValue::DateTime(_))),
                "HasException" => assert!(matches!(value, SqlValue::Bool(false))),
                "ScheduleId" => assert!(matches!(value, SqlValue::Null)),
                other => panic!("unexpected column {other}"),
            }
        }

        let err = attendance
            .validate(&json!({"EmployeeId": "not-a-guid"}), WriteMode::Update)
            .unwrap_err();
        assert_eq!(err.0, vec!["EmployeeId must be a GUID".to_string()]);
    }

    #[test]
    fn required_columns_cannot_be_nulled() {
        let punch_logs = catalog().table("PunchLogs").unwrap();
        let err = punch_logs
            .validate(&json!({"PunchDateTime": null}), WriteMode::Update)
            .unwrap_err();
        assert_eq!(err.0, vec!["PunchDateTime is required".to_string()]);
    }

    #[test]
    fn rendered_context_mentions_relationships() {
        let text = catalog().render_context();

        assert!(text.contains("Table: Employees (entity Employee)"));
        assert!(text.contains("  - SiteId -> Sites.Id (on delete: NoAction)"));
        assert!(text.contains("View: vw_EmployeeAttendanceDashboard"));
        assert!(text.contains("  - Name: text(255), required"));
    }
}
