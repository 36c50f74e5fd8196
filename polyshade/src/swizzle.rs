//! Swizzle masks.

use crate::error::{Result, ShaderError};
use std::fmt;

/// Select a channel to extract from into a swizzled expession.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SwizzleSelector {
  /// Select the `.x` (or `.r`) channel.
  X,

  /// Select the `.y` (or `.g`) channel.
  Y,

  /// Select the `.z` (or `.b`) channel.
  Z,

  /// Select the `.w` (or `.a`) channel.
  W,
}

impl SwizzleSelector {
  /// Index of the selected component.
  pub const fn index(self) -> u8 {
    match self {
      SwizzleSelector::X => 0,
      SwizzleSelector::Y => 1,
      SwizzleSelector::Z => 2,
      SwizzleSelector::W => 3,
    }
  }

  fn from_letter(c: char) -> Option<(Self, LetterSet)> {
    let sel = match c {
      'x' => (SwizzleSelector::X, LetterSet::Position),
      'y' => (SwizzleSelector::Y, LetterSet::Position),
      'z' => (SwizzleSelector::Z, LetterSet::Position),
      'w' => (SwizzleSelector::W, LetterSet::Position),
      'r' => (SwizzleSelector::X, LetterSet::Color),
      'g' => (SwizzleSelector::Y, LetterSet::Color),
      'b' => (SwizzleSelector::Z, LetterSet::Color),
      'a' => (SwizzleSelector::W, LetterSet::Color),
      _ => return None,
    };

    Some(sel)
  }

  fn letter(self, set: LetterSet) -> char {
    let letters = match set {
      LetterSet::Position => ['x', 'y', 'z', 'w'],
      LetterSet::Color => ['r', 'g', 'b', 'a'],
    };

    letters[self.index() as usize]
  }
}

/// Letters a swizzle mask was written with.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LetterSet {
  /// `xyzw`
  Position,

  /// `rgba`
  Color,
}

/// Swizzle channel selector.
///
/// Holds between one and four selectors, along with the letter set used to write them so that the mask renders back
/// the way it was written.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Swizzle {
  selectors: [SwizzleSelector; 4],
  len: u8,
  set: LetterSet,
}

impl Swizzle {
  /// Parse a swizzle mask applied to a vector of `components` components.
  ///
  /// The mask must use letters from a single set, select existing components only and have at most as many letters
  /// as the vector has components.
  pub fn parse(mask: &str, components: u8) -> Result<Self> {
    if mask.is_empty() || mask.len() > components.min(4) as usize {
      return Err(ShaderError::type_error(format!(
        "swizzle mask `{}` must have between 1 and {} letters",
        mask,
        components.min(4)
      )));
    }

    let mut selectors = [SwizzleSelector::X; 4];
    let mut set = None;

    for (i, c) in mask.chars().enumerate() {
      let (sel, letter_set) = SwizzleSelector::from_letter(c)
        .ok_or_else(|| ShaderError::type_error(format!("`{}` is not a swizzle letter in `{}`", c, mask)))?;

      match set {
        Some(s) if s != letter_set => {
          return Err(ShaderError::type_error(format!(
            "swizzle mask `{}` mixes xyzw and rgba letters",
            mask
          )));
        }

        _ => set = Some(letter_set),
      }

      if sel.index() >= components {
        return Err(ShaderError::type_error(format!(
          "swizzle mask `{}` selects `{}` on a vector of {} components",
          mask, c, components
        )));
      }

      selectors[i] = sel;
    }

    Ok(Swizzle {
      selectors,
      len: mask.len() as u8,
      set: set.unwrap_or(LetterSet::Position),
    })
  }

  pub fn len(&self) -> u8 {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn selectors(&self) -> &[SwizzleSelector] {
    &self.selectors[..self.len as usize]
  }

  /// Whether no component is selected twice, which is required to write through the mask.
  pub fn is_unique(&self) -> bool {
    let sel = self.selectors();
    sel
      .iter()
      .enumerate()
      .all(|(i, s)| !sel[..i].contains(s))
  }
}

impl fmt::Display for Swizzle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for sel in self.selectors() {
      write!(f, "{}", sel.letter(self.set))?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn parse_masks() {
    let sw = Swizzle::parse("xzy", 3).unwrap();
    assert_eq!(
      sw.selectors(),
      &[SwizzleSelector::X, SwizzleSelector::Z, SwizzleSelector::Y]
    );
    assert_eq!(sw.to_string(), "xzy");

    let sw = Swizzle::parse("bgra", 4).unwrap();
    assert_eq!(sw.to_string(), "bgra");
  }

  #[test]
  fn reject_bad_masks() {
    assert!(Swizzle::parse("xg", 4).is_err());
    assert!(Swizzle::parse("xyzwx", 4).is_err());
    assert!(Swizzle::parse("z", 2).is_err());
    assert!(Swizzle::parse("xyx", 2).is_err());
    assert!(Swizzle::parse("", 2).is_err());
    assert!(Swizzle::parse("q", 4).is_err());
  }

  #[test]
  fn unique_masks() {
    assert!(Swizzle::parse("xy", 2).unwrap().is_unique());
    assert!(!Swizzle::parse("xx", 2).unwrap().is_unique());
  }
}
