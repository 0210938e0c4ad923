use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::Range;
use std::path::Path;

/// One comma-separated field of a model object.
#[derive(Clone, Debug)]
pub struct Field {
  pub value: String,
  /// `!-` comment following the field, if any.
  pub label: Option<String>,
  // Byte range of `value` in the template text. Empty fields get an empty
  // range just before their terminator.
  span: Range<usize>,
}

/// A typed, named object of the model. Field 0 is the class keyword and
/// field 1 the object name, so positions line up with the simulator's own
/// field numbering offset by one.
#[derive(Clone, Debug)]
pub struct IdfObject {
  pub line: usize,
  fields: Vec<Field>,
}

impl IdfObject {
  pub fn class(&self) -> &str {
    &self.fields[0].value
  }

  pub fn name(&self) -> Option<&str> {
    self.fields.get(1).map(|f| f.value.as_str())
  }

  pub fn fields(&self) -> &[Field] {
    &self.fields
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  /// Position of the field whose `!-` label matches `name`, ignoring case,
  /// punctuation and a trailing unit such as `{W}`.
  pub fn labeled_position(&self, name: &str) -> Option<usize> {
    let wanted = normalize_field_name(name);
    self.fields.iter().position(|f| {
      f.label
        .as_ref()
        .map_or(false, |label| normalize_field_name(label) == wanted)
    })
  }
}

/// Canonical form of a field name: lower case, units dropped, runs of
/// non-alphanumerics collapsed to `_`. "Design Level {W}" and
/// "Design_Level" both become "design_level".
pub fn normalize_field_name(name: &str) -> String {
  let without_units = match name.find('{') {
    Some(pos) => &name[..pos],
    None => name,
  };
  let mut out = String::with_capacity(without_units.len());
  for c in without_units.chars() {
    if c.is_alphanumeric() {
      out.extend(c.to_lowercase());
    } else if !out.is_empty() && !out.ends_with('_') {
      out.push('_');
    }
  }
  while out.ends_with('_') {
    out.pop();
  }
  out
}

/// True when `value` would be accepted as a number by the simulator.
pub fn is_numeric(value: &str) -> bool {
  value.trim().parse::<f64>().is_ok()
}

/// Identifies an object inside a particular template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

/// A parsed building model used as a read-only skeleton. The source text
/// is kept so that copies can be written back with every untouched byte
/// preserved.
#[derive(Debug)]
pub struct ModelTemplate {
  text: String,
  objects: Vec<IdfObject>,
  index: HashMap<(String, String), ObjectId>,
}

impl ModelTemplate {
  pub fn load(path: &Path) -> Result<ModelTemplate> {
    let text = fs::read_to_string(path).map_err(Error::io(path))?;
    ModelTemplate::parse(text)
  }

  pub fn parse(text: String) -> Result<ModelTemplate> {
    let objects = Parser::new(&text).run()?;
    let mut index = HashMap::new();
    for (i, object) in objects.iter().enumerate() {
      if let Some(name) = object.name() {
        // The first of several same-named objects wins.
        index
          .entry(object_key(object.class(), name))
          .or_insert(ObjectId(i));
      }
    }
    Ok(ModelTemplate {
      text,
      objects,
      index,
    })
  }

  pub fn objects(&self) -> &[IdfObject] {
    &self.objects
  }

  pub fn object(&self, id: ObjectId) -> &IdfObject {
    &self.objects[id.0]
  }

  /// Looks an object up by class and name, both case-insensitive.
  pub fn find(&self, class: &str, name: &str) -> Option<ObjectId> {
    self.index.get(&object_key(class, name)).cloned()
  }

  /// A fresh, independent copy to be edited.
  pub fn instantiate(&self) -> ModelInstance {
    ModelInstance {
      template: self,
      edits: BTreeMap::new(),
    }
  }
}

fn object_key(class: &str, name: &str) -> (String, String) {
  (class.trim().to_uppercase(), name.trim().to_uppercase())
}

/// An edited copy of a template. Edits are kept apart from the template and
/// spliced in on rendering.
pub struct ModelInstance<'t> {
  template: &'t ModelTemplate,
  edits: BTreeMap<(usize, usize), String>,
}

impl<'t> ModelInstance<'t> {
  pub fn template(&self) -> &'t ModelTemplate {
    self.template
  }

  /// Current value of a field, edits included.
  pub fn field(&self, id: ObjectId, position: usize) -> Option<&str> {
    if let Some(value) = self.edits.get(&(id.0, position)) {
      return Some(value);
    }
    self
      .template
      .object(id)
      .fields
      .get(position)
      .map(|f| f.value.as_str())
  }

  /// Overwrites a field. Returns false, leaving the copy unchanged, when the
  /// object has no field at `position`.
  pub fn set_field(&mut self, id: ObjectId, position: usize, value: String) -> bool {
    if position >= self.template.object(id).len() {
      return false;
    }
    self.edits.insert((id.0, position), value);
    true
  }

  pub fn edit_count(&self) -> usize {
    self.edits.len()
  }

  pub fn render(&self) -> String {
    let text = &self.template.text;
    let mut out = String::with_capacity(text.len() + 16 * self.edits.len());
    let mut cursor = 0;
    // Keys sort in object order then field order, which is source order.
    for (&(object, field), value) in &self.edits {
      let span = &self.template.objects[object].fields[field].span;
      out.push_str(&text[cursor..span.start]);
      out.push_str(value);
      cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    fs::write(path, self.render()).map_err(Error::io(path))
  }
}

struct Parser<'a> {
  text: &'a str,
  line: usize,
  objects: Vec<IdfObject>,
  fields: Vec<Field>,
  object_line: usize,
  field_start: Option<usize>,
  field_end: usize,
  // Object index, field index and line of the last terminated field; a `!-`
  // comment on that line labels it.
  last: Option<(usize, usize, usize)>,
}

impl<'a> Parser<'a> {
  fn new(text: &'a str) -> Parser<'a> {
    Parser {
      text,
      line: 1,
      objects: Vec::new(),
      fields: Vec::new(),
      object_line: 1,
      field_start: None,
      field_end: 0,
      last: None,
    }
  }

  fn run(mut self) -> Result<Vec<IdfObject>> {
    let text = self.text;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
      match bytes[i] {
        b'!' => {
          let end = text[i..].find('\n').map_or(bytes.len(), |n| i + n);
          self.comment(&text[i + 1..end]);
          i = end;
          continue;
        }
        b'\n' => self.line += 1,
        b',' => self.terminate_field(i),
        b';' => {
          self.terminate_field(i);
          self.terminate_object()?;
        }
        c if c.is_ascii_whitespace() => {}
        _ => {
          if self.field_start.is_none() {
            self.field_start = Some(i);
            if self.fields.is_empty() {
              self.object_line = self.line;
            }
          }
          self.field_end = i + 1;
        }
      }
      i += 1;
    }
    if self.field_start.is_some() || !self.fields.is_empty() {
      return Err(Error::ModelParse {
        line: self.object_line,
        reason: "object is not terminated by ';'".to_string(),
      });
    }
    Ok(self.objects)
  }

  fn comment(&mut self, comment: &str) {
    let label = match comment.strip_prefix('-') {
      Some(label) => label.trim(),
      None => return,
    };
    if let Some((object, field, line)) = self.last {
      if line != self.line || label.is_empty() {
        return;
      }
      let target = if object < self.objects.len() {
        &mut self.objects[object].fields[field]
      } else {
        &mut self.fields[field]
      };
      if target.label.is_none() {
        target.label = Some(label.to_string());
      }
    }
  }

  fn terminate_field(&mut self, at: usize) {
    let span = match self.field_start.take() {
      Some(start) => start..self.field_end,
      None => at..at,
    };
    if self.fields.is_empty() {
      self.object_line = self.line;
    }
    self.fields.push(Field {
      value: self.text[span.clone()].to_string(),
      label: None,
      span,
    });
    self.last = Some((self.objects.len(), self.fields.len() - 1, self.line));
  }

  fn terminate_object(&mut self) -> Result<()> {
    let fields = std::mem::replace(&mut self.fields, Vec::new());
    if fields.iter().all(|f| f.value.is_empty()) {
      // A stray ';' carries no object.
      self.last = None;
      return Ok(());
    }
    if fields[0].value.is_empty() {
      return Err(Error::ModelParse {
        line: self.object_line,
        reason: "object has no class keyword".to_string(),
      });
    }
    self.objects.push(IdfObject {
      line: self.object_line,
      fields,
    });
    Ok(())
  }
}
