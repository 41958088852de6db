//! Shopping cart and wishlist.

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use greens_core::{ProductId, UserId};

use crate::db::{CartRepository, ProductRepository, RepositoryError};
use crate::error::{DomainError, ErrorKind};
use crate::models::cart::{Cart, WishlistEntry};

/// Upper bound on a single requested quantity.
pub const MAX_LINE_QUANTITY: i32 = 999;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    InvalidQuantity,

    #[error("product not found")]
    ProductNotFound,

    #[error("item is not in the cart")]
    NotInCart,

    #[error("item is not in the wishlist")]
    NotInWishlist,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DomainError for CartError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuantity => ErrorKind::Validation,
            Self::ProductNotFound | Self::NotInCart | Self::NotInWishlist => ErrorKind::NotFound,
            Self::Repository(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::ProductNotFound => "PRODUCT_NOT_FOUND",
            Self::NotInCart => "NOT_IN_CART",
            Self::NotInWishlist => "NOT_IN_WISHLIST",
            Self::Repository(e) => e.code(),
        }
    }
}

pub struct CartService<'a> {
    cart: CartRepository<'a>,
    products: ProductRepository<'a>,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            cart: CartRepository::new(pool),
            products: ProductRepository::new(pool),
        }
    }

    /// The cart at current prices.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn get(&self, user: UserId) -> Result<Cart, CartError> {
        Ok(Cart::from_lines(self.cart.lines(user).await?))
    }

    /// Add `quantity` of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` or `ProductNotFound`.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn add(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i32,
    ) -> Result<Cart, CartError> {
        check_quantity(quantity)?;
        self.require_listed(product).await?;

        self.cart.add(user, product, quantity).await?;
        self.get(user).await
    }

    /// Set a line's quantity; anything below 1 removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product is not in the cart.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn update(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i32,
    ) -> Result<Cart, CartError> {
        if quantity < 1 {
            self.remove(user, product).await?;
        } else {
            check_quantity(quantity)?;
            self.cart
                .set_quantity(user, product, quantity)
                .await
                .map_err(|e| missing(e, CartError::NotInCart))?;
        }
        self.get(user).await
    }

    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product is not in the cart.
    pub async fn remove(&self, user: UserId, product: ProductId) -> Result<(), CartError> {
        self.cart
            .remove(user, product)
            .await
            .map_err(|e| missing(e, CartError::NotInCart))
    }

    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn wishlist(&self, user: UserId) -> Result<Vec<WishlistEntry>, CartError> {
        Ok(self.cart.wishlist(user).await?)
    }

    /// Add to the wishlist. Adding a product twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ProductNotFound` for unknown or unlisted products.
    pub async fn wishlist_add(&self, user: UserId, product: ProductId) -> Result<(), CartError> {
        self.require_listed(product).await?;
        Ok(self.cart.wishlist_add(user, product).await?)
    }

    /// # Errors
    ///
    /// Returns `CartError::NotInWishlist` if the product is not wishlisted.
    pub async fn wishlist_remove(&self, user: UserId, product: ProductId) -> Result<(), CartError> {
        self.cart
            .wishlist_remove(user, product)
            .await
            .map_err(|e| missing(e, CartError::NotInWishlist))
    }

    async fn require_listed(&self, product: ProductId) -> Result<(), CartError> {
        match self.products.get(product).await? {
            Some(p) if p.is_active => Ok(()),
            _ => Err(CartError::ProductNotFound),
        }
    }
}

const fn check_quantity(quantity: i32) -> Result<(), CartError> {
    if quantity < 1 || quantity > MAX_LINE_QUANTITY {
        return Err(CartError::InvalidQuantity);
    }
    Ok(())
}

fn missing(e: RepositoryError, not_found: CartError) -> CartError {
    match e {
        RepositoryError::NotFound => not_found,
        other => CartError::Repository(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_bounds() {
        assert!(check_quantity(1).is_ok());
        assert!(check_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(matches!(check_quantity(0), Err(CartError::InvalidQuantity)));
        assert!(matches!(check_quantity(-3), Err(CartError::InvalidQuantity)));
        assert!(check_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_missing_rows_map_to_specific_errors() {
        assert!(matches!(
            missing(RepositoryError::NotFound, CartError::NotInCart),
            CartError::NotInCart
        ));
        assert!(matches!(
            missing(RepositoryError::Conflict("x".into()), CartError::NotInCart),
            CartError::Repository(_)
        ));
        assert_eq!(CartError::NotInWishlist.kind(), ErrorKind::NotFound);
    }
}
