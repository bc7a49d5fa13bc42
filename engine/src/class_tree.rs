// SPDX-FileCopyrightText: 2024 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! The class tree: a registry of classes, each with a parent, a name, and a
//! table of methods. Objects are created from a class, and carry a reference
//! to it so that their methods can be looked up without the tree.
//!
//! Classes are registered parents-first, and unregistered children-first.
//! Both orders are enforced: registering under an unknown parent and
//! unregistering a class with children are errors.

mod methods;

use core::{
    any::Any,
    cell::RefCell,
    fmt::{self, Debug, Display},
};

use alloc::{boxed::Box, collections::BTreeMap, rc::Rc, vec::Vec};
use arrayvec::ArrayString;
use enum_map::EnumMap;
use tracing::debug;

pub use methods::{Method, MethodType};

/// The longest class name that can be registered, in bytes.
pub const MAX_CLASS_NAME_LEN: usize = 64;

/// Identifies a class. Conventionally a four character code.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectType(u32);

impl ObjectType {
    /// The root of every class tree.
    pub const SHARED: ObjectType = ObjectType::from_fourcc(*b"shrd");

    pub const fn from_fourcc(code: [u8; 4]) -> ObjectType {
        ObjectType(u32::from_be_bytes(code))
    }

    pub const fn to_fourcc(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.to_fourcc();
        if code.iter().all(|c| c.is_ascii_graphic() || *c == b' ') {
            for c in code {
                fmt::Write::write_char(f, c as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectType({self})")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassTreeError {
    /// No class is registered with the type.
    UnregisteredType(ObjectType),
    /// A class is already registered with the type.
    AlreadyRegistered(ObjectType),
    /// The class can't be unregistered before its subclasses.
    HasChildren(ObjectType),
    /// The class name is longer than [`MAX_CLASS_NAME_LEN`].
    NameTooLong,
    /// An object's instance data wasn't of the type its methods expected.
    InstanceMismatch,
    /// The class isn't a subclass of the class required for the operation.
    NotKindOf {
        object_type: ObjectType,
        expected: ObjectType,
    },
}

impl Display for ClassTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassTreeError::UnregisteredType(t) => write!(f, "class {t} is not registered"),
            ClassTreeError::AlreadyRegistered(t) => write!(f, "class {t} is already registered"),
            ClassTreeError::HasChildren(t) => write!(f, "class {t} still has subclasses"),
            ClassTreeError::NameTooLong => write!(f, "class name is too long"),
            ClassTreeError::InstanceMismatch => write!(f, "unexpected instance data type"),
            ClassTreeError::NotKindOf {
                object_type,
                expected,
            } => write!(f, "class {object_type} is not a kind of {expected}"),
        }
    }
}

impl core::error::Error for ClassTreeError {}

/// A registered class.
pub struct ClassInfo {
    object_type: ObjectType,
    name: ArrayString<MAX_CLASS_NAME_LEN>,
    parent: Option<ObjectType>,
    /// Root first, parent last.
    ancestors: Vec<ObjectType>,
    /// Resolved at registration: the class's own methods over the ones
    /// inherited from its parent.
    methods: EnumMap<MethodType, Option<Method>>,
}

impl Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("object_type", &self.object_type)
            .field("name", &self.name.as_str())
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl ClassInfo {
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ObjectType> {
        self.parent
    }

    /// The ancestors of the class, from the root down to the parent.
    pub fn ancestors(&self) -> &[ObjectType] {
        &self.ancestors
    }

    /// Returns `true` if the class is `object_type` or a subclass of it.
    pub fn is_kind_of(&self, object_type: ObjectType) -> bool {
        self.object_type == object_type || self.ancestors.contains(&object_type)
    }

    /// Returns the class on this class's ancestry (itself included) which is
    /// a direct subclass of `ancestor`.
    pub fn child_of_ancestor(&self, ancestor: ObjectType) -> Option<ObjectType> {
        let position = self.ancestors.iter().position(|t| *t == ancestor)?;
        Some(
            self.ancestors
                .get(position + 1)
                .copied()
                .unwrap_or(self.object_type),
        )
    }

    /// The method of the type, either the class's own or inherited.
    pub fn method(&self, method_type: MethodType) -> Option<Method> {
        self.methods[method_type]
    }
}

/// An instance of a class.
pub struct Object {
    class: Rc<ClassInfo>,
    instance: Box<dyn Any>,
}

/// An object shared between multiple owners, e.g. a storage used by a file
/// format. Released when the last owner drops it.
pub type SharedObject = Rc<RefCell<Object>>;

impl Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

impl Object {
    pub fn class(&self) -> &ClassInfo {
        &self.class
    }

    /// The type of the object's own class.
    pub fn object_type(&self) -> ObjectType {
        self.class.object_type
    }

    pub fn is_kind_of(&self, object_type: ObjectType) -> bool {
        self.class.is_kind_of(object_type)
    }

    pub fn method(&self, method_type: MethodType) -> Option<Method> {
        self.class.method(method_type)
    }

    /// Returns the instance data if it's a `T`.
    pub fn instance<T: Any>(&self) -> Option<&T> {
        self.instance.downcast_ref()
    }

    /// Returns the instance data if it's a `T`.
    pub fn instance_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.instance.downcast_mut()
    }

    /// The instance data as-is, for passing into methods.
    pub fn instance_any(&self) -> &dyn Any {
        &*self.instance
    }

    /// The instance data as-is, for passing into methods.
    pub fn instance_any_mut(&mut self) -> &mut dyn Any {
        &mut *self.instance
    }

    /// Wraps the object for sharing.
    pub fn into_shared(self) -> SharedObject {
        Rc::new(RefCell::new(self))
    }
}

/// The registry of classes. Starts out with just the root class,
/// [`ObjectType::SHARED`].
pub struct ClassTree {
    classes: BTreeMap<ObjectType, Rc<ClassInfo>>,
}

impl Debug for ClassTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.classes.values()).finish()
    }
}

impl Default for ClassTree {
    fn default() -> Self {
        ClassTree::new()
    }
}

impl ClassTree {
    pub fn new() -> ClassTree {
        let root = ClassInfo {
            object_type: ObjectType::SHARED,
            name: ArrayString::from("Shared").unwrap_or_default(),
            parent: None,
            ancestors: Vec::new(),
            methods: EnumMap::default(),
        };
        let mut classes = BTreeMap::new();
        classes.insert(ObjectType::SHARED, Rc::new(root));
        ClassTree { classes }
    }

    /// The amount of registered classes, including the root.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn is_registered(&self, object_type: ObjectType) -> bool {
        self.classes.contains_key(&object_type)
    }

    /// Registers a new class as a subclass of `parent`, which must already be
    /// registered. The class inherits all of its parent's methods, and
    /// `methods` override them.
    pub fn register_class(
        &mut self,
        parent: ObjectType,
        object_type: ObjectType,
        name: &str,
        methods: &[Method],
    ) -> Result<(), ClassTreeError> {
        if self.classes.contains_key(&object_type) {
            return Err(ClassTreeError::AlreadyRegistered(object_type));
        }
        let parent_class = self
            .classes
            .get(&parent)
            .ok_or(ClassTreeError::UnregisteredType(parent))?;
        let name = ArrayString::from(name).map_err(|_| ClassTreeError::NameTooLong)?;

        let mut resolved_methods = parent_class.methods.clone();
        for method in methods {
            resolved_methods[method.method_type()] = Some(*method);
        }

        let mut ancestors = Vec::with_capacity(parent_class.ancestors.len() + 1);
        ancestors.extend_from_slice(&parent_class.ancestors);
        ancestors.push(parent);

        debug!(%object_type, %parent, name = name.as_str(), "registered class");
        self.classes.insert(
            object_type,
            Rc::new(ClassInfo {
                object_type,
                name,
                parent: Some(parent),
                ancestors,
                methods: resolved_methods,
            }),
        );
        Ok(())
    }

    /// Removes the class from the tree. Objects created from it stay usable,
    /// but no new ones can be created.
    pub fn unregister_class(&mut self, object_type: ObjectType) -> Result<(), ClassTreeError> {
        if !self.classes.contains_key(&object_type) {
            return Err(ClassTreeError::UnregisteredType(object_type));
        }
        if self.classes.values().any(|class| class.parent == Some(object_type)) {
            return Err(ClassTreeError::HasChildren(object_type));
        }
        self.classes.remove(&object_type);
        debug!(%object_type, "unregistered class");
        Ok(())
    }

    pub fn class_by_type(&self, object_type: ObjectType) -> Option<&Rc<ClassInfo>> {
        self.classes.get(&object_type)
    }

    /// Returns the method of the class, either its own or inherited.
    pub fn method(&self, object_type: ObjectType, method_type: MethodType) -> Option<Method> {
        self.classes.get(&object_type)?.method(method_type)
    }

    /// Creates an object of the class, with instance data from the class's
    /// [`Method::NewObject`], or `()` if it doesn't have one.
    pub fn create_instance(&self, object_type: ObjectType) -> Result<Object, ClassTreeError> {
        let class = self.class_rc(object_type)?;
        let instance = match class.method(MethodType::NewObject) {
            Some(Method::NewObject(new_object)) => new_object(),
            _ => Box::new(()),
        };
        Ok(Object { class, instance })
    }

    /// Creates an object of the class with the given instance data, for
    /// classes whose instance data needs parameters to create.
    pub fn create_instance_with(
        &self,
        object_type: ObjectType,
        instance: Box<dyn Any>,
    ) -> Result<Object, ClassTreeError> {
        let class = self.class_rc(object_type)?;
        Ok(Object { class, instance })
    }

    fn class_rc(&self, object_type: ObjectType) -> Result<Rc<ClassInfo>, ClassTreeError> {
        self.classes
            .get(&object_type)
            .cloned()
            .ok_or(ClassTreeError::UnregisteredType(object_type))
    }
}
