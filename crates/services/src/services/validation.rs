//! Payload checks applied before any write reaches the database.

use db::models::{
    note::{CreateNote, UpdateNote},
    routine::{CreateRoutine, UpdateRoutine},
    sector::{CreateSector, UpdateSector},
    task::{CreateTask, UpdateTask},
    unit::{CreateUnit, UpdateUnit},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::text::char_len;

use super::notes_board::GridPosition;

pub const ROUTINE_TITLE_MAX: usize = 200;
pub const TASK_TITLE_MAX: usize = 255;
pub const NOTE_TITLE_MAX: usize = 120;
pub const NAME_MAX: usize = 120;
pub const DESCRIPTION_MAX: usize = 5000;
pub const NOTE_COLOR_MAX: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

#[derive(Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn required(&mut self, field: &str, label: &str, value: &str, max: usize) -> &mut Self {
        if value.trim().is_empty() {
            self.errors
                .push(FieldError::new(field, format!("{label} é obrigatório")));
        } else {
            self.max_len(field, label, Some(value), max);
        }
        self
    }

    /// Like `required`, but only when the field is present (partial updates).
    fn present(&mut self, field: &str, label: &str, value: Option<&str>, max: usize) -> &mut Self {
        if let Some(value) = value {
            self.required(field, label, value, max);
        }
        self
    }

    fn max_len(&mut self, field: &str, label: &str, value: Option<&str>, max: usize) -> &mut Self {
        if value.is_some_and(|v| char_len(v.trim()) > max) {
            self.errors.push(FieldError::new(
                field,
                format!("{label} deve ter no máximo {max} caracteres"),
            ));
        }
        self
    }

    fn check(&mut self, field: &str, ok: bool, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    fn finish(&mut self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }
}

impl Validate for CreateRoutine {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::default()
            .required("title", "Título", &self.title, ROUTINE_TITLE_MAX)
            .max_len("description", "Descrição", self.description.as_deref(), DESCRIPTION_MAX)
            .check(
                "unit_ids",
                !(self.unit_id.is_some() && self.unit_ids.as_ref().is_some_and(|ids| !ids.is_empty())),
                "Informe uma unidade ou uma lista de unidades, não ambos",
            )
            .finish()
    }
}

impl Validate for UpdateRoutine {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::default()
            .present("title", "Título", self.title.as_deref(), ROUTINE_TITLE_MAX)
            .max_len("description", "Descrição", self.description.as_deref(), DESCRIPTION_MAX)
            .finish()
    }
}

impl Validate for CreateTask {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let dates_ordered = match (self.start_date, self.due_date) {
            (Some(start), Some(due)) => start <= due,
            _ => true,
        };
        Checker::default()
            .required("title", "Título", &self.title, TASK_TITLE_MAX)
            .max_len("description", "Descrição", self.description.as_deref(), DESCRIPTION_MAX)
            .check(
                "due_date",
                dates_ordered,
                "A data de entrega deve ser posterior à data de início",
            )
            .finish()
    }
}

impl Validate for UpdateTask {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::default()
            .present("title", "Título", self.title.as_deref(), TASK_TITLE_MAX)
            .max_len("description", "Descrição", self.description.as_deref(), DESCRIPTION_MAX)
            .finish()
    }
}

impl Validate for CreateNote {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::default()
            .required("title", "Título", &self.title, NOTE_TITLE_MAX)
            .max_len("content", "Conteúdo", self.content.as_deref(), DESCRIPTION_MAX)
            .max_len("color", "Cor", self.color.as_deref(), NOTE_COLOR_MAX)
            .check(
                "pos_x",
                GridPosition::new(self.pos_x.unwrap_or(0), self.pos_y.unwrap_or(0)).within_board(),
                "Posição inválida",
            )
            .finish()
    }
}

impl Validate for UpdateNote {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::default()
            .present("title", "Título", self.title.as_deref(), NOTE_TITLE_MAX)
            .max_len("content", "Conteúdo", self.content.as_deref(), DESCRIPTION_MAX)
            .max_len("color", "Cor", self.color.as_deref(), NOTE_COLOR_MAX)
            .finish()
    }
}

impl Validate for CreateSector {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::default()
            .required("name", "Nome", &self.name, NAME_MAX)
            .max_len("description", "Descrição", self.description.as_deref(), DESCRIPTION_MAX)
            .finish()
    }
}

impl Validate for UpdateSector {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::default()
            .present("name", "Nome", self.name.as_deref(), NAME_MAX)
            .max_len("description", "Descrição", self.description.as_deref(), DESCRIPTION_MAX)
            .finish()
    }
}

impl Validate for CreateUnit {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::default()
            .required("name", "Nome", &self.name, NAME_MAX)
            .max_len("code", "Código", self.code.as_deref(), 32)
            .finish()
    }
}

impl Validate for UpdateUnit {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Checker::default()
            .present("name", "Nome", self.name.as_deref(), NAME_MAX)
            .max_len("code", "Código", self.code.as_deref(), 32)
            .finish()
    }
}
