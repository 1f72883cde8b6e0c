//! Hot-reloadable function slots and their registry
//!
//! A host keeps each reloadable function in a [`HotFn`] and always calls
//! through it. The registry records `(symbol name, slot)` pairs at startup;
//! the loader later rewrites the slots with addresses resolved from a freshly
//! opened library.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, Ordering};

use tracing::debug;

/// A function pointer type that can live in a [`HotFn`].
///
/// # Safety
/// Implementors must be plain, pointer-sized function pointers.
pub unsafe trait FnPtr: Copy + Send + Sync + 'static {
    /// Erase the pointer to a raw address.
    fn into_raw(self) -> *mut c_void;

    /// Rebuild the function pointer from a raw address.
    ///
    /// # Safety
    /// `ptr` must be the address of a function with exactly this signature
    /// that stays mapped for as long as the result is callable.
    unsafe fn from_raw(ptr: NonNull<c_void>) -> Self;
}

macro_rules! impl_fn_ptr {
    ($($arg:ident),*) => {
        unsafe impl<Ret: 'static, $($arg: 'static),*> FnPtr for extern "C" fn($($arg),*) -> Ret {
            fn into_raw(self) -> *mut c_void {
                self as *mut c_void
            }

            unsafe fn from_raw(ptr: NonNull<c_void>) -> Self {
                unsafe { std::mem::transmute_copy::<*mut c_void, Self>(&ptr.as_ptr()) }
            }
        }

        unsafe impl<Ret: 'static, $($arg: 'static),*> FnPtr for unsafe extern "C" fn($($arg),*) -> Ret {
            fn into_raw(self) -> *mut c_void {
                self as *mut c_void
            }

            unsafe fn from_raw(ptr: NonNull<c_void>) -> Self {
                unsafe { std::mem::transmute_copy::<*mut c_void, Self>(&ptr.as_ptr()) }
            }
        }
    };
}

impl_fn_ptr!();
impl_fn_ptr!(A);
impl_fn_ptr!(A, B);
impl_fn_ptr!(A, B, C);
impl_fn_ptr!(A, B, C, D);
impl_fn_ptr!(A, B, C, D, E);
impl_fn_ptr!(A, B, C, D, E, G);

/// A function pointer cell owned by the host and rewritten on reload.
///
/// Reads use acquire ordering and rewrites use release ordering, so a caller
/// on any thread sees a fully published pointer.
pub struct HotFn<F: FnPtr> {
    ptr: AtomicPtr<c_void>,
    _marker: PhantomData<F>,
}

impl<F: FnPtr> HotFn<F> {
    /// Create a slot pointing at the statically linked implementation.
    pub fn new(initial: F) -> Self {
        Self {
            ptr: AtomicPtr::new(initial.into_raw()),
            _marker: PhantomData,
        }
    }

    /// The function currently bound to this slot.
    pub fn get(&self) -> F {
        let raw = self.ptr.load(Ordering::Acquire);
        // A slot is only ever written with a non-null function address of type F.
        match NonNull::new(raw) {
            Some(ptr) => unsafe { F::from_raw(ptr) },
            None => unreachable!("hot function slot holds a null pointer"),
        }
    }

    /// Raw address currently stored.
    pub fn address(&self) -> *mut c_void {
        self.ptr.load(Ordering::Acquire)
    }
}

impl<F: FnPtr> fmt::Debug for HotFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotFn")
            .field("address", &self.address())
            .finish()
    }
}

/// Type-erased view of a [`HotFn`] used by the loader.
pub trait SymbolSlot: Send + Sync {
    /// Point the slot at a resolved symbol address.
    ///
    /// # Safety
    /// `addr` must be a function with the slot's signature, and the module it
    /// lives in must stay open while the slot can still be called.
    unsafe fn rebind(&self, addr: NonNull<c_void>);

    fn address(&self) -> *mut c_void;
}

impl<F: FnPtr> SymbolSlot for HotFn<F> {
    unsafe fn rebind(&self, addr: NonNull<c_void>) {
        self.ptr.store(addr.as_ptr(), Ordering::Release);
    }

    fn address(&self) -> *mut c_void {
        HotFn::address(self)
    }
}

/// A named symbol and the slot it is bound into.
#[derive(Clone)]
pub struct RegisteredSymbol {
    pub name: String,
    pub slot: Arc<dyn SymbolSlot>,
}

impl fmt::Debug for RegisteredSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSymbol")
            .field("name", &self.name)
            .field("address", &self.slot.address())
            .finish()
    }
}

/// Append-only, ordered list of registered symbols.
///
/// Duplicate names are kept; each one is rebound on every reload, so the last
/// registration for a slot wins.
#[derive(Debug, Clone, Default)]
pub struct SymbolRegistry {
    symbols: Vec<RegisteredSymbol>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `slot` to be rebound to the exported symbol `name`.
    pub fn register<F: FnPtr>(&mut self, name: &str, slot: &Arc<HotFn<F>>) {
        debug!("Registering function {}", name);
        let slot: Arc<dyn SymbolSlot> = slot.clone();
        self.symbols.push(RegisteredSymbol {
            name: name.to_string(),
            slot,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSymbol> {
        self.symbols.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.symbols.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
