// Web查询层
pub mod web;
