//! A small in-memory notebook exposed as `notes`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;

use bindrun::Args;
use bindrun::Bindable;
use bindrun::EventChannel;
use bindrun::InvokeError;
use bindrun::MethodSpec;
use bindwire::Kind;
use bindwire::TypeDef;
use bindwire::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub body: String,
}

#[derive(Serialize)]
struct Changed {
    count: usize,
}

#[derive(Default)]
struct Book {
    next_id: i64,
    notes: BTreeMap<i64, Note>,
}

pub struct Notes {
    book: Mutex<Book>,
    events: EventChannel,
}

impl Notes {
    pub fn new(events: EventChannel) -> Self {
        Self { book: Mutex::new(Book::default()), events }
    }

    fn book(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn changed(&self, count: usize) {
        if let Err(e) = self.events.emit("changed", &Changed { count }) {
            tracing::warn!(error = %e, "change notification not sent");
        }
    }
}

#[async_trait::async_trait]
impl Bindable for Notes {
    fn qualifier(&self) -> String {
        "notes".into()
    }

    fn types(&self) -> Vec<TypeDef> {
        vec![
            TypeDef::new("Note")
                .field("id", Kind::Integer)
                .field("title", Kind::String)
                .field("body", Kind::String),
        ]
    }

    fn methods(&self) -> Vec<MethodSpec> {
        vec![
            MethodSpec::new("add")
                .param("title", Kind::String)
                .param("body", Kind::String)
                .returns(Kind::Integer),
            MethodSpec::new("add").param("title", Kind::String).returns(Kind::Integer),
            MethodSpec::new("get").param("id", Kind::Integer).returns(Kind::named("Note")),
            MethodSpec::new("list").returns(Kind::array_of(Kind::named("Note"))),
            MethodSpec::new("remove").param("id", Kind::Integer).returns(Kind::Boolean),
        ]
    }

    async fn invoke(&self, method: &str, args: Args) -> Result<Value, InvokeError> {
        match method {
            "add" => {
                let title: String = args.decode(0)?;
                let body: String = if args.len() > 1 { args.decode(1)? } else { String::new() };
                let (id, count) = {
                    let mut book = self.book();
                    book.next_id += 1;
                    let id = book.next_id;
                    book.notes.insert(id, Note { id, title, body });
                    (id, book.notes.len())
                };
                self.changed(count);
                Ok(Value::Int(id))
            }
            "get" => {
                let id: i64 = args.decode(0)?;
                let note = self
                    .book()
                    .notes
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| InvokeError::new(format!("no note with id {}", id)))?;
                Ok(Value::from_serialize(&note)?)
            }
            "list" => {
                let notes: Vec<Note> = self.book().notes.values().cloned().collect();
                Ok(Value::from_serialize(&notes)?)
            }
            "remove" => {
                let id: i64 = args.decode(0)?;
                let (removed, count) = {
                    let mut book = self.book();
                    (book.notes.remove(&id).is_some(), book.notes.len())
                };
                if removed {
                    self.changed(count);
                }
                Ok(Value::Bool(removed))
            }
            other => Err(InvokeError::new(format!("notes has no method '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: Vec<Value>) -> Args {
        Args::new(values)
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let notes = Notes::new(EventChannel::new());

        let id = notes.invoke("add", args(vec!["first".into(), "body".into()])).await.unwrap();
        assert_eq!(id, Value::Int(1));
        notes.invoke("add", args(vec!["second".into()])).await.unwrap();

        let listed = notes.invoke("list", Args::default()).await.unwrap();
        let listed: Vec<Note> = listed.deserialize_into().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].body, "");

        let removed = notes.invoke("remove", args(vec![Value::Int(1)])).await.unwrap();
        assert_eq!(removed, Value::Bool(true));
        let removed = notes.invoke("remove", args(vec![Value::Int(1)])).await.unwrap();
        assert_eq!(removed, Value::Bool(false));
    }

    #[tokio::test]
    async fn test_missing_note_is_an_error() {
        let notes = Notes::new(EventChannel::new());
        let err = notes.invoke("get", args(vec![Value::Int(9)])).await.unwrap_err();
        assert_eq!(err.message(), "no note with id 9");
    }

    #[tokio::test]
    async fn test_note_matches_declared_shape() {
        let notes = Notes::new(EventChannel::new());
        notes.invoke("add", args(vec!["t".into()])).await.unwrap();
        let value = notes.invoke("get", args(vec![Value::Int(1)])).await.unwrap();
        let expected: Value = serde_json::json!({"id": 1, "title": "t", "body": ""}).into();
        assert_eq!(value, expected);
    }
}
