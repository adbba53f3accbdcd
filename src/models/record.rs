//! 目录记录与表格行

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// 缺失字段的占位值
pub const SENTINEL: &str = "N/A";

/// 目录记录中的固定字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogField {
    PartNumber,
    PartName,
    VehicleModel,
    VehicleYear,
    RetailPrice,
    WholesalePrice,
}

impl CatalogField {
    pub const ALL: [CatalogField; 6] = [
        CatalogField::PartNumber,
        CatalogField::PartName,
        CatalogField::VehicleModel,
        CatalogField::VehicleYear,
        CatalogField::RetailPrice,
        CatalogField::WholesalePrice,
    ];

    /// 模型输出中的 JSON 键名
    pub fn key(&self) -> &'static str {
        match self {
            CatalogField::PartNumber => "part_number",
            CatalogField::PartName => "part_name",
            CatalogField::VehicleModel => "vehicle_model",
            CatalogField::VehicleYear => "vehicle_year",
            CatalogField::RetailPrice => "retail_price",
            CatalogField::WholesalePrice => "wholesale_price",
        }
    }

    /// 表头名称
    pub fn header(&self) -> &'static str {
        match self {
            CatalogField::PartNumber => "Part Number",
            CatalogField::PartName => "Part Name",
            CatalogField::VehicleModel => "Vehicle Model",
            CatalogField::VehicleYear => "Vehicle Year",
            CatalogField::RetailPrice => "Retail Price",
            CatalogField::WholesalePrice => "Wholesale Price",
        }
    }
}

/// 解析器产出的一条记录
///
/// 只保证是一个 JSON 对象，不保证字段齐全
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExtractedRecord {
    fields: Map<String, JsonValue>,
}

impl ExtractedRecord {
    pub fn new(fields: Map<String, JsonValue>) -> Self {
        Self { fields }
    }

    pub fn raw(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    /// 取字段的文本值，缺失或为空时返回占位值
    pub fn field_or_sentinel(&self, field: CatalogField) -> String {
        match self.fields.get(field.key()) {
            Some(JsonValue::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(JsonValue::Number(n)) => n.to_string(),
            Some(JsonValue::Bool(b)) => b.to_string(),
            _ => SENTINEL.to_string(),
        }
    }
}

/// 写入表格的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub captured_at: String,
    pub image_name: String,
    /// 按 `CatalogField::ALL` 的顺序
    pub values: Vec<String>,
}

impl CatalogRow {
    /// 表头
    pub fn header() -> Vec<String> {
        let mut header = vec!["Timestamp".to_string(), "Image".to_string()];
        header.extend(CatalogField::ALL.iter().map(|f| f.header().to_string()));
        header
    }

    pub fn from_record(record: &ExtractedRecord, image_name: &str, captured_at: &str) -> Self {
        Self {
            captured_at: captured_at.to_string(),
            image_name: image_name.to_string(),
            values: CatalogField::ALL
                .iter()
                .map(|f| record.field_or_sentinel(*f))
                .collect(),
        }
    }

    /// 没有数据或失败时的占位行，说明放在第一个内容字段
    pub fn placeholder(note: &str, image_name: &str, captured_at: &str) -> Self {
        let mut values = vec![SENTINEL.to_string(); CatalogField::ALL.len()];
        if !note.trim().is_empty() {
            values[0] = note.to_string();
        }
        Self {
            captured_at: captured_at.to_string(),
            image_name: image_name.to_string(),
            values,
        }
    }

    pub fn to_cells(&self) -> Vec<String> {
        let mut cells = vec![self.captured_at.clone(), self.image_name.clone()];
        cells.extend(self.values.iter().cloned());
        cells
    }
}
