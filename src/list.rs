use std::fmt::Debug;
use std::ops::{Index, IndexMut};

/// Slot arena with a free list. Erased slots are handed out again by
/// `insert`, most recently erased first.
#[derive(Clone, Debug)]
pub struct List<T>
    where T: Debug
{
    data: Vec<Option<T>>,
    elements: usize,
    vacant: Vec<usize>,
}

impl<T> List<T>
    where
        T: Debug,
{
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            elements: 0,
            vacant: Vec::new(),
        }
    }

    /// Number of occupied slots.
    pub fn size(&self) -> usize {
        self.elements
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.data.get_mut(index)?.as_mut()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.elements = 0;
        self.vacant.clear();
    }

    pub fn insert(&mut self, element: T) -> usize {
        self.elements += 1;
        if let Some(index) = self.vacant.pop() {
            self.data[index] = Some(element);
            return index;
        }
        self.data.push(Some(element));
        self.data.len() - 1
    }

    pub fn erase(&mut self, index: usize) -> Option<T> {
        let element = self.data.get_mut(index)?.take()?;
        self.elements -= 1;
        self.vacant.push(index);
        Some(element)
    }
}

impl<T: Debug> Index<usize> for List<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(element) => element,
            None => panic!("slot {index} is vacant"),
        }
    }
}

impl<T: Debug> IndexMut<usize> for List<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.get_mut(index) {
            Some(element) => element,
            None => panic!("slot {index} is vacant"),
        }
    }
}

impl<T: Debug> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}
