use super::element::{Element, ValidateError, ValidateErrorCode, ValidateMode};
use super::master::SectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u32);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageClass {
    pub id: String,
    pub file: String,
    pub frame_count: i32,
}

impl ImageClass {
    pub fn new(id: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file: file.into(),
            frame_count: 1,
        }
    }

    pub fn with_frame_count(mut self, frame_count: i32) -> Self {
        self.frame_count = frame_count;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageRegistry {
    images: Vec<ImageClass>,
}

impl ImageRegistry {
    pub fn insert(&mut self, class: ImageClass) -> ImageHandle {
        self.images.push(class);
        ImageHandle((self.images.len() - 1) as u32)
    }

    pub fn get(&self, handle: ImageHandle) -> Option<&ImageClass> {
        self.images.get(handle.0 as usize)
    }

    pub fn get_mut(&mut self, handle: ImageHandle) -> Option<&mut ImageClass> {
        self.images.get_mut(handle.0 as usize)
    }

    pub fn remove(&mut self, handle: ImageHandle) -> Option<ImageClass> {
        if (handle.0 as usize) < self.images.len() {
            Some(self.images.remove(handle.0 as usize))
        } else {
            None
        }
    }

    pub fn find(&self, id: &str) -> Option<ImageHandle> {
        if id.is_empty() {
            return None;
        }
        self.images
            .iter()
            .position(|class| class.id == id)
            .map(|slot| ImageHandle(slot as u32))
    }

    pub fn classes(&self) -> &[ImageClass] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub(crate) fn validate(&self, mode: ValidateMode) -> Result<(), ValidateError> {
        if !mode.is_strict() {
            return Ok(());
        }
        for class in &self.images {
            if class.id.is_empty() {
                return Err(ValidateError {
                    code: ValidateErrorCode::EmptyIdentifier,
                    section: SectionId::Images,
                    owner: class.file.clone(),
                    field: "id",
                    identifier: String::new(),
                    message: "image class has an empty id".to_string(),
                });
            }
            if class.frame_count < 1 {
                return Err(ValidateError {
                    code: ValidateErrorCode::ValueOutOfRange,
                    section: SectionId::Images,
                    owner: class.id.clone(),
                    field: "frame_count",
                    identifier: class.id.clone(),
                    message: format!(
                        "image '{}' must have at least 1 frame, got {}",
                        class.id, class.frame_count
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Image classes are pure definitions; nothing in this section refers to
/// another class, so the cascade reports zero occurrences.
impl Element for ImageRegistry {
    fn process_identifier(&mut self, _old_id: &str, _new_id: Option<&str>) -> usize {
        0
    }
}
