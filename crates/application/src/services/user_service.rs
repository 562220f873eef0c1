//! 用户注册、登录与搜索

use std::sync::Arc;

use domain::{DomainError, User, UserEmail, UserId, UserRepository, Username};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dto::UserDto;
use crate::error::ApplicationError;
use crate::password::PasswordHasher;

/// 搜索结果上限
const SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticateUserRequest {
    pub email: String,
    pub password: String,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let username = Username::parse(request.username)?;
        let email = UserEmail::parse(request.email)?;

        if self
            .deps
            .user_repository
            .find_by_email(email.clone())
            .await?
            .is_some()
        {
            return Err(DomainError::UserAlreadyExists.into());
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;

        let now = self.deps.clock.now();
        let user = User::register(
            UserId::from(Uuid::new_v4()),
            username,
            email,
            password_hash,
            now,
        );

        let stored = self.deps.user_repository.create(user).await?;
        Ok(stored)
    }

    pub async fn authenticate(
        &self,
        request: AuthenticateUserRequest,
    ) -> Result<User, ApplicationError> {
        let email = UserEmail::parse(request.email)?;
        let user = self
            .deps
            .user_repository
            .find_by_email(email)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            return Err(ApplicationError::Authentication);
        }

        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(UserId::from(user_id))
            .await?
            .ok_or_else(|| DomainError::UserNotFound.into())
    }

    /// 按用户名搜索其他用户，空白关键字直接返回空列表
    pub async fn search_users(
        &self,
        term: &str,
        requester_id: Uuid,
    ) -> Result<Vec<UserDto>, ApplicationError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let users = self
            .deps
            .user_repository
            .search_by_username(term, UserId::from(requester_id), SEARCH_LIMIT)
            .await?;

        Ok(users.iter().map(UserDto::from).collect())
    }
}
