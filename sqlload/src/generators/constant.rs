use rand::RngCore;

use super::Generator;

pub struct Constant<T> {
    value: T,
}

impl<T> Constant<T> {
    pub fn new(value: T) -> Self {
        Constant { value }
    }
}

impl<T: Clone + Send + Sync + 'static> Generator<T> for Constant<T> {
    fn next(&self, _: &mut dyn RngCore) -> T {
        self.value.clone()
    }
}
