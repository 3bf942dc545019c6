//! # Shared Cart State
//!
//! The cart the UI mutates between sales, shared with the finalize
//! flow.
//!
//! ## Thread Safety
//! `Arc<Mutex<Cart>>` because UI commands and the finalize flow may
//! touch the cart from different tasks, and only one of them should at
//! a time. The finalize flow reads one snapshot at validation time and
//! clears the cart only on completion; while it is in flight the busy
//! flag keeps a second finalize out, and the design assumes a single
//! active finalize per cart instance.

use std::sync::{Arc, Mutex};

use caixa_core::cart::Cart;

/// Shared handle to the live cart.
#[derive(Debug, Clone, Default)]
pub struct CartHandle {
    cart: Arc<Mutex<Cart>>,
}

impl CartHandle {
    /// Creates a handle to a new empty cart.
    pub fn new() -> Self {
        CartHandle {
            cart: Arc::new(Mutex::new(Cart::new())),
        }
    }

    /// Executes a function with read access to the cart.
    ///
    /// ```rust,ignore
    /// let subtotal = handle.with_cart(|c| c.subtotal_cents());
    /// ```
    pub fn with_cart<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Cart) -> R,
    {
        let cart = self.cart.lock().expect("Cart mutex poisoned");
        f(&cart)
    }

    /// Executes a function with write access to the cart.
    ///
    /// ```rust,ignore
    /// handle.with_cart_mut(|c| c.add_item(&product, 1))?;
    /// ```
    pub fn with_cart_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Cart) -> R,
    {
        let mut cart = self.cart.lock().expect("Cart mutex poisoned");
        f(&mut cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caixa_core::types::Product;
    use chrono::Utc;

    #[test]
    fn test_snapshot_and_clear() {
        let handle = CartHandle::new();
        let product = Product {
            id: "p1".to_string(),
            sku: "SKU-1".to_string(),
            barcode: None,
            name: "Produto".to_string(),
            price_cents: 1000,
            promotion: None,
            quantity_discount: None,
            ncm: "22021000".to_string(),
            cfop: "5102".to_string(),
            csosn: "102".to_string(),
            unit: "UN".to_string(),
            track_stock: false,
            allow_negative_stock: false,
            current_stock: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        handle
            .with_cart_mut(|c| c.add_item(&product, 2))
            .unwrap();
        let snapshot = handle.with_cart(|c| c.clone());
        assert_eq!(snapshot.subtotal_cents(), 2000);

        handle.with_cart_mut(|c| c.clear());
        assert!(handle.with_cart(|c| c.is_empty()));
        // The earlier snapshot is unaffected.
        assert_eq!(snapshot.subtotal_cents(), 2000);
    }
}
