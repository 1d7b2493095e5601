use std::ops::Deref;

/// A value that passed [`Validatable::validate`].
///
/// The only way to obtain one is [`Validatable::into_valid`], so holding a `Valid<T>` proves the
/// snapshot was checked. The contents can be read but not changed in place, every change goes
/// through [`Valid::edit`], which checks the result again.
#[repr(transparent)]
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Valid<T>(T);

impl<T> Valid<T> {
    /// returns the wrapped value owned, consumes the Valid struct
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Validatable + Clone> Valid<T> {
    /// Applies `edit` to a copy of the value and validates the result.
    ///
    /// On failure the last valid value is handed back together with the errors, so the caller
    /// can keep it as the snapshot to fall back to.
    pub fn edit<F>(self, edit: F) -> Result<Self, (Self, T::Error)>
    where
        F: FnOnce(&mut T),
    {
        let mut edited = self.0.clone();
        edit(&mut edited);

        match edited.validate() {
            Ok(()) => Ok(Valid(edited)),
            Err(err) => Err((self, err)),
        }
    }
}

impl<T> Deref for Valid<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> AsRef<T> for Valid<T> {
    fn as_ref(&self) -> &T {
        &self.0
    }
}

/// A value whose consistency can only be decided by looking at it as a whole.
///
/// Implementing it provides the only way of constructing a [`Valid<T>`].
pub trait Validatable: Sized {
    type Error;

    fn validate(&self) -> Result<(), Self::Error>;

    /// Calls [`Validatable::validate`] and wraps the value if it passes.
    fn into_valid(self) -> Result<Valid<Self>, Self::Error> {
        self.validate()?;
        Ok(Valid(self))
    }
}
