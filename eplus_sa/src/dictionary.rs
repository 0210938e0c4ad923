use crate::error::{Error, Result};
use crate::idf::normalize_field_name;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Field names per object class, read from the simulator's data dictionary
/// (`Energy+.idd`). Only the parts needed to resolve named fields are kept.
#[derive(Clone, Debug, Default)]
pub struct DataDictionary {
  classes: HashMap<String, Vec<String>>,
}

impl DataDictionary {
  pub fn load(path: &Path) -> Result<DataDictionary> {
    let text = fs::read_to_string(path).map_err(Error::io(path))?;
    let dictionary = DataDictionary::parse(&text)?;
    debug!(
      "Loaded {} object classes from {}.",
      dictionary.len(),
      path.display()
    );
    Ok(dictionary)
  }

  /// Parses dictionary text. Class lines start in the first column; field
  /// lines are indented, start with an `A` or `N` code and carry their name
  /// in a `\field` annotation.
  pub fn parse(text: &str) -> Result<DataDictionary> {
    let mut classes: HashMap<String, Vec<String>> = HashMap::new();
    let mut current: Option<String> = None;
    for (n, raw) in text.lines().enumerate() {
      let line = raw.trim_end();
      let trimmed = line.trim_start();
      if trimmed.is_empty() || trimmed.starts_with('!') {
        continue;
      }
      let indented = trimmed.len() != line.len();
      if !indented && !trimmed.starts_with('\\') {
        let end = trimmed.find(|c| c == ',' || c == ';').ok_or_else(|| {
          Error::DictionaryParse {
            line: n + 1,
            reason: format!("class line '{}' has no terminator", trimmed),
          }
        })?;
        let class = trimmed[..end].trim().to_uppercase();
        classes.entry(class.clone()).or_insert_with(Vec::new);
        current = Some(class);
        continue;
      }
      let class = match current {
        Some(ref class) => class,
        None => continue,
      };
      let fields = classes.entry(class.clone()).or_insert_with(Vec::new);
      if let Some(rest) = field_code(trimmed) {
        let name = annotation(rest, "\\field")
          .map(str::to_string)
          .unwrap_or_else(|| format!("Field {}", fields.len() + 1));
        fields.push(name);
      } else if let Some(name) = annotation(trimmed, "\\field") {
        // Name given on the line after its field code.
        if let Some(last) = fields.last_mut() {
          if last.starts_with("Field ") {
            *last = name.to_string();
          }
        }
      }
    }
    Ok(DataDictionary { classes })
  }

  pub fn len(&self) -> usize {
    self.classes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.classes.is_empty()
  }

  /// Field names of `class`, the name field first.
  pub fn fields(&self, class: &str) -> Option<&[String]> {
    self
      .classes
      .get(&class.trim().to_uppercase())
      .map(|f| f.as_slice())
  }

  /// Position of a named field within an object of `class`, counting the
  /// class keyword as position 0.
  pub fn field_position(&self, class: &str, field: &str) -> Option<usize> {
    let wanted = normalize_field_name(field);
    self
      .fields(class)?
      .iter()
      .position(|name| normalize_field_name(name) == wanted)
      .map(|i| i + 1)
  }
}

// Returns the remainder of a field line (`A1 , \field Name`) after its
// terminator, or None when the line is not a field line.
fn field_code(line: &str) -> Option<&str> {
  let mut chars = line.char_indices();
  match chars.next() {
    Some((_, 'A')) | Some((_, 'N')) => {}
    _ => return None,
  }
  let mut saw_digit = false;
  for (i, c) in chars {
    if c.is_ascii_digit() {
      saw_digit = true;
    } else if saw_digit && (c == ',' || c == ';') {
      return Some(&line[i + 1..]);
    } else if !(saw_digit && c.is_whitespace()) {
      return None;
    }
  }
  None
}

fn annotation<'a>(line: &'a str, key: &str) -> Option<&'a str> {
  let start = line.find(key)? + key.len();
  let value = line[start..].trim();
  if value.is_empty() {
    None
  } else {
    Some(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const IDD: &str = "\
!IDD_Version 24.1.0
\\group Internal Gains

ElectricEquipment,
      \\memo Sets internal gains for electric equipment in the zone.
  A1 , \\field Name
      \\required-field
  A2 , \\field Zone or ZoneList or Space or SpaceList Name
  A3 , \\field Schedule Name
  A4 , \\field Design Level Calculation Method
  N1 , \\field Design Level
      \\units W
  N2 , \\field Watts per Zone Floor Area
  N3 ; \\field Fraction Latent

Coil:Heating:DX:MultiSpeed,
  A1 , \\field Name
  N1 ,
      \\field Speed 1 Gross Rated Heating COP
  N2 ; \\field Speed 2 Gross Rated Heating COP

Lead Input;
";

  #[test]
  fn resolves_named_fields() {
    let dictionary = DataDictionary::parse(IDD).unwrap();
    assert_eq!(dictionary.len(), 3);
    assert_eq!(
      dictionary.field_position("ELECTRICEQUIPMENT", "Design_Level"),
      Some(5)
    );
    assert_eq!(
      dictionary.field_position("electricequipment", "Fraction Latent"),
      Some(7)
    );
    assert_eq!(
      dictionary.field_position(
        "COIL:HEATING:DX:MULTISPEED",
        "Speed 2 Gross Rated Heating COP"
      ),
      Some(3)
    );
    assert_eq!(dictionary.field_position("Lights", "Lighting Level"), None);
    assert_eq!(dictionary.fields("Lead Input").map(|f| f.len()), Some(0));
  }

  #[test]
  fn name_on_following_line() {
    let dictionary = DataDictionary::parse(IDD).unwrap();
    let fields = dictionary.fields("Coil:Heating:DX:MultiSpeed").unwrap();
    assert_eq!(fields[1], "Speed 1 Gross Rated Heating COP");
  }

  #[test]
  fn class_line_without_terminator_is_an_error() {
    match DataDictionary::parse("Version\n  A1 ; \\field Version Identifier\n") {
      Err(Error::DictionaryParse { line, .. }) => assert_eq!(line, 1),
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[test]
  fn field_code_detection() {
    assert_eq!(field_code("A1 , \\field Name"), Some(" \\field Name"));
    assert_eq!(field_code("N12; \\field X"), Some(" \\field X"));
    assert_eq!(field_code("\\field Name"), None);
    assert_eq!(field_code("Always On"), None);
  }
}
